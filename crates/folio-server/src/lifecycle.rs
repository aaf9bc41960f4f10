//! Process lifecycle: bootstrap, serve, graceful shutdown.
//!
//! Boot order: telemetry (profiler, then traces, then metrics), then the
//! tracing slot, then routes and bind. Shutdown order: stop accepting,
//! drain in-flight requests, then drain traces and stop the profiler side
//! by side. One deadline, set when the gate fires, bounds all of it.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;

use folio_core::error::{FolioError, Result};

use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::router;
use crate::telemetry::{ShutdownReport, TelemetryState, TracingSlot};

/// One-shot shutdown trigger shared by the signal watcher and the server.
#[derive(Clone)]
pub struct ShutdownGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the gate. Only the first call returns `true`.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the gate has fired (immediately if it already has).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ShutdownGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a listening server.
pub struct Bootstrap {
    cfg: AppConfig,
    slot: Option<TracingSlot>,
}

impl Bootstrap {
    pub fn new(cfg: AppConfig) -> Self {
        Self { cfg, slot: None }
    }

    /// Slot that receives the trace exporter's tracer once it is up.
    pub fn with_tracing_slot(mut self, slot: TracingSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Start telemetry, build routes and bind the listener.
    pub async fn bind(self) -> Result<BoundServer> {
        self.cfg.server.validate()?;
        let addr = self.cfg.server.listen_addr();
        let (host, port) = (self.cfg.server.host.clone(), self.cfg.server.port);

        let telemetry = TelemetryState::start(self.cfg.telemetry.clone())
            .map_err(|e| FolioError::Internal(format!("metrics registration failed: {e}")))?;
        if let (Some(slot), Some(tracer)) = (&self.slot, telemetry.pipeline().tracer()) {
            slot.install(tracer);
        }

        let state = AppState::new(self.cfg, Arc::new(telemetry));
        let app = router::build_router(state.clone());

        // Resolves host names too; resolve failures surface as bind errors.
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|source| FolioError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| FolioError::Bind { addr, source })?;
        tracing::info!(%local_addr, "folio listening");

        Ok(BoundServer { listener, app, state, local_addr })
    }
}

/// A bound, not yet serving, server.
pub struct BoundServer {
    listener: TcpListener,
    app: Router,
    state: AppState,
    local_addr: SocketAddr,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_gate(&self) -> ShutdownGate {
        self.state.shutdown_gate()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until the shutdown gate fires, then drain. Telemetry drain
    /// failures are reported, never returned as errors.
    pub async fn run(self) -> Result<ShutdownReport> {
        let BoundServer { listener, app, state, local_addr } = self;
        let gate = state.shutdown_gate();
        let signals = match SignalWatcher::install() {
            Ok(watcher) => Some(tokio::spawn(watcher.run(gate.clone()))),
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handlers");
                None
            }
        };
        let grace = state.telemetry().config().drain_timeout();
        tracing::info!(%local_addr, "accepting connections");

        let stop = gate.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.wait().await })
            .into_future();
        let mut server = std::pin::pin!(server);

        let (served, deadline) = tokio::select! {
            biased;
            _ = gate.wait() => {
                let deadline = Instant::now() + grace;
                if let Err(e) = state.telemetry().metrics().draining.set(&[], 1) {
                    tracing::error!(error = %e, "draining gauge misuse");
                }
                tracing::info!(?grace, "draining in-flight requests");
                let served = match tokio::time::timeout_at(deadline, &mut server).await {
                    Ok(res) => res,
                    Err(_) => {
                        tracing::warn!(?grace, "in-flight requests did not finish in time");
                        Ok(())
                    }
                };
                (served, deadline)
            }
            res = &mut server => (res, Instant::now() + grace),
        };
        if let Some(signals) = signals {
            signals.abort();
        }

        let report = state.telemetry().shutdown_by(deadline).await;
        tracing::info!(
            traces = ?report.traces,
            profiler_stopped = report.profiler_stopped,
            "shutdown complete"
        );

        served.map_err(|e| FolioError::Internal(format!("server error: {e}")))?;
        Ok(report)
    }
}

/// First SIGINT/SIGTERM fires the gate; later ones are ignored.
///
/// Handlers are registered in [`SignalWatcher::install`], before the server
/// starts accepting, so an early signal is never fatal.
struct SignalWatcher {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalWatcher {
    #[cfg(unix)]
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Next termination signal; `false` once no more can arrive.
    #[cfg(unix)]
    async fn recv(&mut self) -> bool {
        tokio::select! {
            s = self.interrupt.recv() => s.is_some(),
            s = self.terminate.recv() => s.is_some(),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> bool {
        tokio::signal::ctrl_c().await.is_ok()
    }

    async fn run(mut self, gate: ShutdownGate) {
        while self.recv().await {
            if gate.trigger() {
                tracing::info!("signal received, starting graceful shutdown");
            } else {
                tracing::debug!("shutdown already in progress, signal ignored");
            }
        }
    }
}
