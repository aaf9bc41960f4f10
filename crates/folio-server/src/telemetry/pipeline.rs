//! Trace export pipeline (OTLP over gRPC, batched).
//!
//! Lifecycle: `Unconfigured | Starting -> Running -> Draining -> Stopped`.
//! - no endpoint configured => `Unconfigured`, nothing ever touches the network
//! - exporter setup error => logged, pipeline stays `Unconfigured`
//! - collector unreachable => the batch processor buffers and drops on its own
//! - `drain` runs at most once; later calls report `AlreadyDraining` or `NotRunning`
//!
//! The pipeline owns the propagator used to continue incoming W3C trace
//! contexts, so nothing here is installed as a process global.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::http::HeaderMap;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::Resource;

use crate::config::TelemetryConfig;

use super::{run_bounded, BoundedError};

/// Per-export RPC timeout handed to the OTLP exporter.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Unconfigured = 0,
    Starting = 1,
    Running = 2,
    Draining = 3,
    Stopped = 4,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => PipelineState::Starting,
            2 => PipelineState::Running,
            3 => PipelineState::Draining,
            4 => PipelineState::Stopped,
            _ => PipelineState::Unconfigured,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Unconfigured => "unconfigured",
            PipelineState::Starting => "starting",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        }
    }
}

/// Result of [`TracePipeline::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Flushed,
    Failed(String),
    TimedOut,
    /// Nothing to drain (never started, or already stopped).
    NotRunning(PipelineState),
    /// Another caller is draining.
    AlreadyDraining,
}

pub struct TracePipeline {
    state: AtomicU8,
    provider: Mutex<Option<SdkTracerProvider>>,
    tracer: Option<SdkTracer>,
    propagator: TraceContextPropagator,
}

impl TracePipeline {
    pub fn disabled() -> Self {
        Self {
            state: AtomicU8::new(PipelineState::Unconfigured as u8),
            provider: Mutex::new(None),
            tracer: None,
            propagator: TraceContextPropagator::new(),
        }
    }

    /// Build the exporter when an endpoint is configured. Never fails and
    /// never blocks: the gRPC channel connects lazily.
    pub fn start(cfg: &TelemetryConfig) -> Self {
        let Some(endpoint) = cfg.otlp_endpoint.as_deref() else {
            tracing::info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, trace export disabled");
            return Self::disabled();
        };

        let mut pipeline = Self::disabled();
        pipeline.set_state(PipelineState::Starting);

        match build_provider(cfg, endpoint) {
            Ok(provider) => {
                pipeline.tracer = Some(provider.tracer(cfg.service_name.clone()));
                pipeline.provider = Mutex::new(Some(provider));
                pipeline.set_state(PipelineState::Running);
                tracing::info!(
                    service = %cfg.service_name,
                    version = %cfg.service_version,
                    environment = %cfg.environment,
                    %endpoint,
                    "trace export initialized"
                );
            }
            Err(e) => {
                pipeline.set_state(PipelineState::Unconfigured);
                tracing::error!(%endpoint, error = %e, "trace exporter setup failed, trace export disabled");
            }
        }
        pipeline
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: PipelineState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Tracer for the logging layer; `None` unless the exporter came up.
    pub fn tracer(&self) -> Option<SdkTracer> {
        self.tracer.clone()
    }

    /// Remote parent context from W3C `traceparent`/`tracestate` headers.
    pub fn extract_context(&self, headers: &HeaderMap) -> Option<Context> {
        if !self.is_running() {
            return None;
        }
        Some(self.propagator.extract(&HeaderExtractor(headers)))
    }

    /// Flush buffered spans and shut the exporter down, waiting at most
    /// `timeout`. A rejected final export is `Failed`, not `Flushed`. Runs
    /// once; the pipeline ends `Stopped` whatever happens.
    pub async fn drain(&self, timeout: Duration) -> DrainOutcome {
        if let Err(current) = self.state.compare_exchange(
            PipelineState::Running as u8,
            PipelineState::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            let current = PipelineState::from_u8(current);
            tracing::debug!(state = current.as_str(), "trace drain skipped");
            return match current {
                PipelineState::Draining => DrainOutcome::AlreadyDraining,
                other => DrainOutcome::NotRunning(other),
            };
        }

        let provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner).take();
        let outcome = match provider {
            None => DrainOutcome::Flushed,
            Some(provider) => match run_bounded("trace-drain", timeout, move || flush_and_shutdown(&provider)).await {
                Ok(Ok(())) => DrainOutcome::Flushed,
                Ok(Err(e)) => DrainOutcome::Failed(e.to_string()),
                Err(BoundedError::TimedOut(_)) => DrainOutcome::TimedOut,
                Err(BoundedError::Worker(e)) => DrainOutcome::Failed(e),
            },
        };
        self.set_state(PipelineState::Stopped);

        match &outcome {
            DrainOutcome::Flushed => tracing::info!("trace exporter shut down"),
            DrainOutcome::Failed(e) => tracing::warn!(error = %e, "trace exporter shutdown failed"),
            DrainOutcome::TimedOut => {
                tracing::warn!(?timeout, "trace drain timed out, unflushed spans dropped")
            }
            DrainOutcome::NotRunning(_) | DrainOutcome::AlreadyDraining => {}
        }
        outcome
    }
}

/// The flush result wins: `shutdown` succeeds even when the last batch was
/// rejected by the collector.
fn flush_and_shutdown(provider: &SdkTracerProvider) -> OTelSdkResult {
    let flushed = provider.force_flush();
    let shut = provider.shutdown();
    flushed.and(shut)
}

fn build_provider(cfg: &TelemetryConfig, endpoint: &str) -> Result<SdkTracerProvider, String> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())?;

    let resource = Resource::builder()
        .with_service_name(cfg.service_name.clone())
        .with_attribute(KeyValue::new("service.version", cfg.service_version.clone()))
        .with_attribute(KeyValue::new("deployment.environment", cfg.environment.clone()))
        .build();

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}
