use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use serde::Deserialize;
use folio_core::error::{FolioError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Values that were ignored while loading, in the order they were seen.
    #[serde(skip)]
    pub fallbacks: Vec<ConfigFallback>,
}

impl AppConfig {
    /// Listener settings must be usable. Telemetry settings out of range
    /// fall back to their defaults and are recorded in `fallbacks`.
    pub fn validate(&mut self) -> Result<()> {
        self.server.validate()?;
        self.telemetry.sanitize(&mut self.fallbacks);
        Ok(())
    }
}

/// An optional setting that was malformed or out of range and was replaced
/// by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFallback {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl ConfigFallback {
    pub fn new(key: impl Into<String>, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}: {}", self.key, self.value, self.reason)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Browser origin of the deployed frontend, matched exactly.
    #[serde(default)]
    pub frontend_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_url: None,
        }
    }
}

impl ServerSection {
    /// Only emptiness is checked here; the host is resolved at bind time,
    /// so names like `localhost` work.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(FolioError::Config("server.host must not be empty".into()));
        }
        Ok(())
    }

    /// `host:port` as configured, for logs and bind errors.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3001
}

/// Telemetry settings, read once at startup and never mutated.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// OTLP/gRPC collector endpoint. `None` disables trace export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_service_version")]
    pub service_version: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Upper bound for the whole shutdown drain, counted from the signal.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    #[serde(default)]
    pub profiler: ProfilerConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
            service_version: default_service_version(),
            environment: default_environment(),
            drain_timeout_ms: default_drain_timeout_ms(),
            profiler: ProfilerConfig::default(),
        }
    }
}

pub const DRAIN_TIMEOUT_RANGE_MS: RangeInclusive<u64> = 1000..=30000;
pub const SAMPLE_RATE_RANGE: RangeInclusive<u32> = 1..=1000;

impl TelemetryConfig {
    /// Reset out-of-range values to their defaults. Telemetry is optional,
    /// so nothing in here can fail the boot.
    pub fn sanitize(&mut self, fallbacks: &mut Vec<ConfigFallback>) {
        if !DRAIN_TIMEOUT_RANGE_MS.contains(&self.drain_timeout_ms) {
            fallbacks.push(ConfigFallback::new(
                "telemetry.drain_timeout_ms",
                self.drain_timeout_ms,
                "must be between 1000 and 30000",
            ));
            self.drain_timeout_ms = default_drain_timeout_ms();
        }
        if self.service_name.trim().is_empty() {
            fallbacks.push(ConfigFallback::new("telemetry.service_name", "", "must not be empty"));
            self.service_name = default_service_name();
        }
        self.profiler.sanitize(fallbacks);
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_service_name() -> String {
    "bookmanagement-backend".into()
}
fn default_service_version() -> String {
    "1.0.0".into()
}
fn default_environment() -> String {
    "development".into()
}
fn default_drain_timeout_ms() -> u64 {
    5000
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilerConfig {
    /// Pyroscope server. `None` disables profiling.
    #[serde(default)]
    pub server_address: Option<String>,

    #[serde(default = "default_service_name")]
    pub app_name: String,

    #[serde(default)]
    pub basic_auth_user: Option<String>,

    #[serde(default)]
    pub basic_auth_token: Option<String>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            server_address: None,
            app_name: default_service_name(),
            basic_auth_user: None,
            basic_auth_token: None,
            sample_rate: default_sample_rate(),
        }
    }
}

impl ProfilerConfig {
    pub fn sanitize(&mut self, fallbacks: &mut Vec<ConfigFallback>) {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            fallbacks.push(ConfigFallback::new(
                "telemetry.profiler.sample_rate",
                self.sample_rate,
                "must be between 1 and 1000",
            ));
            self.sample_rate = default_sample_rate();
        }
        if self.app_name.trim().is_empty() {
            fallbacks.push(ConfigFallback::new("telemetry.profiler.app_name", "", "must not be empty"));
            self.app_name = default_service_name();
        }
    }
}

// Keeps the auth token out of logs.
impl fmt::Debug for ProfilerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerConfig")
            .field("server_address", &self.server_address)
            .field("app_name", &self.app_name)
            .field("basic_auth_user", &self.basic_auth_user)
            .field("basic_auth_token", &self.basic_auth_token.as_ref().map(|_| "<redacted>"))
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

fn default_sample_rate() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".into()
}
