//! Axum router wiring.
//!
//! Layer order, outermost first: origin gate, request tracking, routes.
//! Rejected origins therefore never show up in the request histogram.

use axum::{middleware, routing::get, Router};

use crate::{app_state::AppState, catalog, obs, ops, policy};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .nest("/api", catalog::routes())
        .fallback(ops::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), obs::http::track_request))
        .layer(middleware::from_fn_with_state(state.clone(), policy::origin_gate))
        .with_state(state)
}
