//! Metric families of the catalog service.

use super::metrics::{Counter, Gauge, Histogram, MetricDefinition, MetricsError, MetricsRegistry};

pub const BOOKS_CREATED: MetricDefinition = MetricDefinition::counter(
    "books_created_total",
    "Total number of books created",
    &["category"],
);

pub const BOOKS_UPDATED: MetricDefinition =
    MetricDefinition::counter("books_updated_total", "Total number of books updated", &[]);

pub const BOOKS_DELETED: MetricDefinition =
    MetricDefinition::counter("books_deleted_total", "Total number of books deleted", &[]);

pub const HTTP_REQUEST_DURATION: MetricDefinition = MetricDefinition::histogram(
    "http_request_duration_seconds",
    "Duration of HTTP requests in seconds",
    &["method", "route", "status_code"],
    &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0],
);

pub const DATABASE_QUERY_DURATION: MetricDefinition = MetricDefinition::histogram(
    "database_query_duration_seconds",
    "Duration of database queries in seconds",
    &["operation", "table"],
    &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0],
);

pub const HTTP_REQUESTS_IN_FLIGHT: MetricDefinition = MetricDefinition::gauge(
    "http_requests_in_flight",
    "Number of HTTP requests currently being served",
    &[],
);

pub const DRAINING: MetricDefinition = MetricDefinition::gauge(
    "folio_draining",
    "1 once graceful shutdown has started",
    &[],
);

/// Category label used for books without a genre.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Handles for every catalog metric, registered once per registry.
#[derive(Clone)]
pub struct CatalogMetrics {
    pub books_created: Counter,
    pub books_updated: Counter,
    pub books_deleted: Counter,
    pub http_request_duration: Histogram,
    pub db_query_duration: Histogram,
    pub http_in_flight: Gauge,
    pub draining: Gauge,
}

impl CatalogMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        Ok(Self {
            books_created: registry.register_counter(BOOKS_CREATED)?,
            books_updated: registry.register_counter(BOOKS_UPDATED)?,
            books_deleted: registry.register_counter(BOOKS_DELETED)?,
            http_request_duration: registry.register_histogram(HTTP_REQUEST_DURATION)?,
            db_query_duration: registry.register_histogram(DATABASE_QUERY_DURATION)?,
            http_in_flight: registry.register_gauge(HTTP_REQUESTS_IN_FLIGHT)?,
            draining: registry.register_gauge(DRAINING)?,
        })
    }
}
