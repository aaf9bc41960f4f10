#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use support::*;

#[tokio::test]
async fn request_without_origin_passes_without_cors_headers() {
    let (app, _) = app();
    let resp = send(&app, get("/healthz")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn empty_origin_header_is_treated_as_absent() {
    let (app, _) = app();
    let resp = send(&app, get_from("/healthz", "")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn loopback_origin_gets_credentialed_cors_headers() {
    let (app, _) = app();
    let resp = send(&app, get_from("/api/books", "http://localhost:3000")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let h = resp.headers();
    assert_eq!(h.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://localhost:3000");
    assert_eq!(h.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    assert!(h
        .get_all(header::VARY)
        .iter()
        .any(|v| v.to_str().unwrap().eq_ignore_ascii_case("origin")));
}

#[tokio::test]
async fn unknown_origin_is_rejected_before_the_handler() {
    let (app, state) = app();
    let mut req = json("POST", "/api/books", json!({ "title": "Dune", "author": "Herbert" }));
    req.headers_mut().insert(header::ORIGIN, "https://evil.example".parse().unwrap());

    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    let body = body_json(resp).await;
    assert_eq!(body["error"], "NOT_ALLOWED");

    assert!(state.store().list_books().await.unwrap().is_empty());
    let created = state.telemetry().metrics().books_created.get(&[("category", "uncategorized")]);
    assert_eq!(created.unwrap(), 0);
}

#[tokio::test]
async fn rejected_requests_are_not_timed() {
    let (app, state) = app();
    let resp = send(&app, get_from("/api/books", "https://evil.example")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let snap = state
        .telemetry()
        .metrics()
        .http_request_duration
        .snapshot(&[("method", "GET"), ("route", "/api/books"), ("status_code", "403")])
        .unwrap();
    assert!(snap.is_none());
}

#[tokio::test]
async fn null_origin_is_rejected() {
    let (app, _) = app();
    let resp = send(&app, get_from("/healthz", "null")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn configured_frontend_is_allowed_exactly() {
    let (app, _) = app_with_frontend("https://books.example.com");

    let resp = send(&app, get_from("/api/quotes", "https://books.example.com")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://books.example.com"
    );

    let resp = send(&app, get_from("/api/quotes", "https://books.example.com.evil")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn internal_frontend_service_is_allowed() {
    let (app, _) = app();
    let resp = send(&app, get_from("/api/quotes", "http://frontend-service:3000")).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn preflight_is_answered_by_the_gate() {
    let (app, _) = app();
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/books/1")
        .header("origin", "http://127.0.0.1:5173")
        .header("access-control-request-method", "PATCH")
        .header("access-control-request-headers", "content-type,traceparent")
        .body(Body::empty())
        .unwrap();

    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let h = resp.headers();
    assert_eq!(h.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://127.0.0.1:5173");
    assert_eq!(h.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    assert_eq!(
        h.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        "GET,HEAD,PUT,PATCH,POST,DELETE"
    );
    assert_eq!(
        h.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
        "content-type,traceparent"
    );
}

#[tokio::test]
async fn preflight_from_unknown_origin_is_rejected() {
    let (app, _) = app();
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/api/books")
        .header("origin", "http://localhost.evil:3000")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
