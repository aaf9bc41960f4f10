//! Shared application state for the folio server.

use std::sync::Arc;

use folio_core::OriginPolicy;

use crate::catalog::{CatalogStore, InMemoryCatalogStore, MeteredStore};
use crate::config::AppConfig;
use crate::lifecycle::ShutdownGate;
use crate::telemetry::TelemetryState;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: AppConfig,
    origin_policy: OriginPolicy,
    telemetry: Arc<TelemetryState>,
    store: Arc<dyn CatalogStore>,
    shutdown: ShutdownGate,
}

impl AppState {
    /// State backed by the in-memory catalog, timed into
    /// `database_query_duration_seconds`.
    pub fn new(cfg: AppConfig, telemetry: Arc<TelemetryState>) -> Self {
        let store = MeteredStore::new(
            InMemoryCatalogStore::new(),
            telemetry.metrics().db_query_duration.clone(),
        );
        Self::with_store(cfg, telemetry, Arc::new(store))
    }

    pub fn with_store(cfg: AppConfig, telemetry: Arc<TelemetryState>, store: Arc<dyn CatalogStore>) -> Self {
        let origin_policy = OriginPolicy::new(cfg.server.frontend_url.clone());
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                origin_policy,
                telemetry,
                store,
                shutdown: ShutdownGate::new(),
            }),
        }
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.inner.cfg
    }

    pub fn origin_policy(&self) -> &OriginPolicy {
        &self.inner.origin_policy
    }

    pub fn telemetry(&self) -> &Arc<TelemetryState> {
        &self.inner.telemetry
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.inner.store
    }

    pub fn shutdown_gate(&self) -> ShutdownGate {
        self.inner.shutdown.clone()
    }

    /// Whether shutdown has begun; readiness reports 503 from then on.
    pub fn is_draining(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }
}
