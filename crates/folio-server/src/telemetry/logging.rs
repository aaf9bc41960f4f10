//! Global `tracing` subscriber.
//!
//! The OpenTelemetry layer sits in a reloadable slot that starts empty, so
//! logging is up before the trace pipeline exists.

use opentelemetry_sdk::trace::SdkTracer;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::config::LogConfig;

type OtelLayer = OpenTelemetryLayer<Registry, SdkTracer>;

// Exporter transport crates log through `tracing` too; keep their spans out
// of the export path.
const QUIET_TARGETS: &str = "hyper=warn,h2=warn,tonic=warn,tower=warn,opentelemetry=warn";

/// Handle to the subscriber's OpenTelemetry slot.
#[derive(Clone)]
pub struct TracingSlot {
    handle: reload::Handle<Option<OtelLayer>, Registry>,
}

impl TracingSlot {
    /// Start exporting `tracing` spans through `tracer`.
    pub fn install(&self, tracer: SdkTracer) -> bool {
        match self.handle.reload(Some(tracing_opentelemetry::layer().with_tracer(tracer))) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install the OpenTelemetry layer");
                false
            }
        }
    }
}

/// Filter from `RUST_LOG`, else the configured level.
pub fn env_filter(cfg: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", cfg.level, QUIET_TARGETS)))
}

/// Install the global subscriber. Call once, first thing in `main`.
pub fn init(cfg: &LogConfig) -> TracingSlot {
    let (otel, handle) = reload::Layer::new(None::<OtelLayer>);
    let registry = tracing_subscriber::registry().with(otel).with(env_filter(cfg));

    if cfg.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }

    TracingSlot { handle }
}
