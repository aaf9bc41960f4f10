//! Origin gate (CORS) in front of every route.
//!
//! Denied origins get a 403 before any handler runs. Allowed browser origins
//! get credentialed CORS headers; preflights are answered here.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use folio_core::error::FolioError;
use folio_core::OriginDecision;

use crate::app_state::AppState;
use crate::error::ApiError;

pub const ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

pub async fn origin_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = match req.headers().get(header::ORIGIN) {
        None => None,
        Some(v) => match v.to_str() {
            Ok(s) => Some(s.to_owned()),
            Err(_) => return reject("<non-utf8>"),
        },
    };

    if state.origin_policy().evaluate(origin.as_deref()) == OriginDecision::Deny {
        return reject(origin.as_deref().unwrap_or_default());
    }

    // No (or empty) origin: not a CORS request.
    let Some(origin) = origin.filter(|o| !o.is_empty()) else {
        return next.run(req).await;
    };
    let Ok(origin) = HeaderValue::from_str(&origin) else {
        return next.run(req).await;
    };

    if is_preflight(&req) {
        return preflight(origin, req.headers());
    }

    let mut resp = next.run(req).await;
    allow_origin(resp.headers_mut(), origin);
    resp
}

fn reject(origin: &str) -> Response {
    tracing::debug!(%origin, "origin rejected");
    ApiError(FolioError::NotAllowed(format!("origin {origin} is not allowed"))).into_response()
}

fn is_preflight(req: &Request) -> bool {
    req.method() == Method::OPTIONS && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

fn preflight(origin: HeaderValue, req_headers: &HeaderMap) -> Response {
    let mut resp = StatusCode::NO_CONTENT.into_response();
    let headers = resp.headers_mut();
    allow_origin(headers, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    if let Some(requested) = req_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    resp
}

fn allow_origin(headers: &mut HeaderMap, origin: HeaderValue) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.append(header::VARY, HeaderValue::from_static("origin"));
}
