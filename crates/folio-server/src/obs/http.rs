//! Per-request span + duration histogram.
//!
//! Added with `Router::layer`, so the matched route template is available.
//! The span is closed and the duration recorded even when the client goes
//! away mid-request (drop guards, no cancellation hooks needed).

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::app_state::AppState;
use crate::obs::metrics::Gauge;

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

struct InFlight(Gauge);

impl InFlight {
    fn enter(gauge: &Gauge) -> Self {
        if let Err(e) = gauge.inc(&[]) {
            tracing::error!(error = %e, "in-flight gauge misuse");
        }
        Self(gauge.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Err(e) = self.0.dec(&[]) {
            tracing::error!(error = %e, "in-flight gauge misuse");
        }
    }
}

pub async fn track_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let matched = req.extensions().get::<MatchedPath>().map(|m| m.as_str().to_owned());
    let route = matched.as_deref().unwrap_or(&path).to_owned();

    let telemetry = state.telemetry();
    let span = {
        // The OTel layer sits behind a reload handle, which hides it from
        // `OpenTelemetrySpanExt`; a root span picks up the attached context.
        let _remote = telemetry.pipeline().extract_context(req.headers()).map(|cx| cx.attach());
        tracing::info_span!(
            "http.request",
            otel.name = %format!("{method} {route}"),
            otel.kind = "server",
            http.request.method = %method,
            http.route = %route,
            url.path = %path,
            http.response.status_code = tracing::field::Empty,
        )
    };

    let metrics = telemetry.metrics();
    let _in_flight = InFlight::enter(&metrics.http_in_flight);
    let started = Instant::now();

    let response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    span.record("http.response.status_code", status.as_u16());

    let route_label = matched.as_deref().unwrap_or(UNMATCHED_ROUTE);
    if let Err(e) = metrics.http_request_duration.observe_duration(
        &[
            ("method", method.as_str()),
            ("route", route_label),
            ("status_code", status.as_str()),
        ],
        started.elapsed(),
    ) {
        tracing::error!(error = %e, "request duration metric misuse");
    }

    response
}
