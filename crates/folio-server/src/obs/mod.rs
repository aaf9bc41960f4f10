//! Observability: the metrics registry, the catalog's metric families,
//! process metrics and the per-request instrumentation middleware.

pub mod families;
pub mod http;
pub mod metrics;
pub mod process;

pub use families::CatalogMetrics;
pub use metrics::{MetricsError, MetricsRegistry};
