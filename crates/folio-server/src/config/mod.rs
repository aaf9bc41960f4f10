//! Config loader: defaults, then an optional strict YAML file, then env vars.
//!
//! Every telemetry setting is optional. Missing, malformed or out-of-range
//! values fall back to defaults and are listed in [`AppConfig::fallbacks`].
//! Only a bad listener setting, an unreadable file or invalid YAML is an
//! error.

pub mod env;
pub mod schema;

use std::fs;

use folio_core::error::{FolioError, Result};

pub use schema::{AppConfig, ConfigFallback, LogConfig, ProfilerConfig, ServerSection, TelemetryConfig};

/// Env var naming an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "FOLIO_CONFIG";

/// Load from the process environment.
pub fn load() -> Result<AppConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Load using `lookup` as the environment.
pub fn load_with<F>(lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match lookup(CONFIG_PATH_VAR).filter(|p| !p.is_empty()) {
        Some(path) => parse_file(&path)?,
        None => AppConfig::default(),
    };
    env::apply(&mut cfg, &lookup)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let mut cfg = parse_file(path)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_str(s: &str) -> Result<AppConfig> {
    let mut cfg = parse_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

fn parse_file(path: &str) -> Result<AppConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| FolioError::Config(format!("read config {path} failed: {e}")))?;
    parse_str(&s)
}

fn parse_str(s: &str) -> Result<AppConfig> {
    // An empty document is a valid "all defaults" config.
    if s.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(s).map_err(|e| FolioError::Config(format!("invalid yaml: {e}")))
}
