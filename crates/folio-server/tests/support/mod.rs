#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, Response};
use axum::Router;
use tower::ServiceExt;

use folio_server::app_state::AppState;
use folio_server::config::AppConfig;
use folio_server::router::build_router;
use folio_server::telemetry::TelemetryState;

/// Router over an in-memory catalog with both exporters off.
pub fn app_with(cfg: AppConfig) -> (Router, AppState) {
    let telemetry = Arc::new(TelemetryState::disabled(cfg.telemetry.clone()).unwrap());
    let state = AppState::new(cfg, telemetry);
    (build_router(state.clone()), state)
}

pub fn app() -> (Router, AppState) {
    app_with(AppConfig::default())
}

pub fn app_with_frontend(url: &str) -> (Router, AppState) {
    let mut cfg = AppConfig::default();
    cfg.server.frontend_url = Some(url.to_owned());
    app_with(cfg)
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_from(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("origin", origin)
        .body(Body::empty())
        .unwrap()
}

pub fn json(method: &str, uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
