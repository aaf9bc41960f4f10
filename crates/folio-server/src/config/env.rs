//! Environment overlay. Empty values are treated as unset.
//!
//! A malformed `PORT` is an error. Every other malformed value is recorded
//! as a [`ConfigFallback`] and the previous value is kept.

use std::str::FromStr;

use folio_core::error::{FolioError, Result};

use super::schema::ConfigFallback;
use super::AppConfig;

pub const PORT: &str = "PORT";
pub const HOST: &str = "HOST";
pub const FRONTEND_URL: &str = "FRONTEND_URL";
pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const SERVICE_VERSION: &str = "OTEL_SERVICE_VERSION";
pub const ENVIRONMENT: &str = "APP_ENV";
/// Read when `APP_ENV` is unset, for deployments that only set the Node-era name.
pub const LEGACY_ENVIRONMENT: &str = "NODE_ENV";
pub const DRAIN_TIMEOUT_MS: &str = "TELEMETRY_DRAIN_TIMEOUT_MS";
pub const PYROSCOPE_URL: &str = "PYROSCOPE_URL";
pub const PYROSCOPE_USER: &str = "PYROSCOPE_USER";
pub const PYROSCOPE_AUTH_TOKEN: &str = "PYROSCOPE_AUTH_TOKEN";
pub const PYROSCOPE_APP_NAME: &str = "PYROSCOPE_APP_NAME";
pub const PYROSCOPE_SAMPLE_RATE: &str = "PYROSCOPE_SAMPLE_RATE";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const LOG_JSON: &str = "LOG_JSON";

pub fn apply<F>(cfg: &mut AppConfig, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get(HOST) {
        cfg.server.host = v;
    }
    if let Some(v) = get(PORT) {
        cfg.server.port = parse(&v).map_err(|e| FolioError::Config(format!("{PORT}={v}: {e}")))?;
    }
    if let Some(v) = get(FRONTEND_URL) {
        cfg.server.frontend_url = Some(v);
    }

    let fallbacks = &mut cfg.fallbacks;
    let t = &mut cfg.telemetry;
    if let Some(v) = get(OTLP_ENDPOINT) {
        t.otlp_endpoint = Some(v);
    }
    if let Some(v) = get(SERVICE_NAME) {
        t.service_name = v;
    }
    if let Some(v) = get(SERVICE_VERSION) {
        t.service_version = v;
    }
    if let Some(v) = get(ENVIRONMENT).or_else(|| get(LEGACY_ENVIRONMENT)) {
        t.environment = v;
    }
    if let Some(v) = get(DRAIN_TIMEOUT_MS) {
        lenient(DRAIN_TIMEOUT_MS, &v, &mut t.drain_timeout_ms, fallbacks);
    }

    let p = &mut t.profiler;
    if let Some(v) = get(PYROSCOPE_URL) {
        p.server_address = Some(v);
    }
    if let Some(v) = get(PYROSCOPE_USER) {
        p.basic_auth_user = Some(v);
    }
    if let Some(v) = get(PYROSCOPE_AUTH_TOKEN) {
        p.basic_auth_token = Some(v);
    }
    if let Some(v) = get(PYROSCOPE_APP_NAME) {
        p.app_name = v;
    }
    if let Some(v) = get(PYROSCOPE_SAMPLE_RATE) {
        lenient(PYROSCOPE_SAMPLE_RATE, &v, &mut p.sample_rate, fallbacks);
    }

    if let Some(v) = get(LOG_LEVEL) {
        cfg.log.level = v;
    }
    if let Some(v) = get(LOG_JSON) {
        match parse_bool(&v) {
            Some(json) => cfg.log.json = json,
            None => fallbacks.push(ConfigFallback::new(LOG_JSON, &v, "expected a boolean")),
        }
    }

    Ok(())
}

fn parse<T>(raw: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| e.to_string())
}

fn lenient<T>(key: &str, raw: &str, slot: &mut T, fallbacks: &mut Vec<ConfigFallback>)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match parse(raw) {
        Ok(v) => *slot = v,
        Err(e) => fallbacks.push(ConfigFallback::new(key, raw, e)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
