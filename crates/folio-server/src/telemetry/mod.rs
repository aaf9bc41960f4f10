//! Process-wide telemetry: logging, trace export, profiling, metrics.
//!
//! [`TelemetryState`] is built once by the bootstrap and shared by handle.
//! Every subsystem in here is best-effort: a missing or unreachable backend
//! degrades to a no-op and never fails a request or the boot.

pub mod logging;
pub mod pipeline;
pub mod profiler;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::TelemetryConfig;
use crate::obs::{CatalogMetrics, MetricsError, MetricsRegistry};

pub use logging::TracingSlot;
pub use pipeline::{DrainOutcome, PipelineState, TracePipeline};
pub use profiler::ProfilerAgent;

pub struct TelemetryState {
    config: TelemetryConfig,
    registry: Arc<MetricsRegistry>,
    metrics: CatalogMetrics,
    pipeline: TracePipeline,
    profiler: ProfilerAgent,
}

/// What the shutdown path managed to flush.
#[derive(Debug)]
pub struct ShutdownReport {
    pub traces: DrainOutcome,
    pub profiler_stopped: bool,
}

impl TelemetryState {
    /// Start the profiler, then the trace pipeline, then register the
    /// catalog metric families. Only metric registration can fail.
    pub fn start(config: TelemetryConfig) -> Result<Self, MetricsError> {
        let profiler = ProfilerAgent::start(&config);
        let pipeline = TracePipeline::start(&config);
        Self::assemble(config, pipeline, profiler)
    }

    /// Same as [`TelemetryState::start`] with both exporters forced off.
    pub fn disabled(config: TelemetryConfig) -> Result<Self, MetricsError> {
        Self::assemble(config, TracePipeline::disabled(), ProfilerAgent::disabled())
    }

    fn assemble(
        config: TelemetryConfig,
        pipeline: TracePipeline,
        profiler: ProfilerAgent,
    ) -> Result<Self, MetricsError> {
        let registry = Arc::new(MetricsRegistry::with_process_metrics());
        let metrics = CatalogMetrics::register(&registry)?;
        Ok(Self { config, registry, metrics, pipeline, profiler })
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> &CatalogMetrics {
        &self.metrics
    }

    pub fn pipeline(&self) -> &TracePipeline {
        &self.pipeline
    }

    pub fn profiler(&self) -> &ProfilerAgent {
        &self.profiler
    }

    /// Drain traces and stop the profiler concurrently. Both are given up
    /// on at `deadline`, so the pair never takes longer than one of them.
    pub async fn shutdown_by(&self, deadline: Instant) -> ShutdownReport {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (traces, profiler_stopped) =
            tokio::join!(self.pipeline.drain(remaining), self.profiler.stop(remaining));
        ShutdownReport { traces, profiler_stopped }
    }
}

#[derive(Debug, Error)]
pub enum BoundedError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("worker thread failed: {0}")]
    Worker(String),
}

/// Run blocking `f` on a dedicated OS thread and wait at most `timeout`.
///
/// On timeout the thread is left behind; it is not tied to the runtime, so
/// it cannot hold up process exit.
pub(crate) async fn run_bounded<T, F>(name: &str, timeout: Duration, f: F) -> Result<T, BoundedError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name(format!("folio-{name}"))
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| BoundedError::Worker(e.to_string()))?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(_)) => Err(BoundedError::Worker(format!("{name} panicked"))),
        Err(_) => Err(BoundedError::TimedOut(timeout)),
    }
}
