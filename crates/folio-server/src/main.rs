//! folio server binary.
//!
//! Config: defaults, then `$FOLIO_CONFIG` (YAML) when set, then env vars.
//! Exits 0 after a signal-driven shutdown, whatever the telemetry drain
//! managed to flush; non-zero only when the server cannot start.

use std::process::ExitCode;

use folio_server::config::{self, LogConfig};
use folio_server::lifecycle::Bootstrap;
use folio_server::telemetry::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init(&LogConfig::default());
            tracing::error!(error = %e, "config load failed");
            return ExitCode::FAILURE;
        }
    };
    let slot = logging::init(&cfg.log);
    for fallback in &cfg.fallbacks {
        tracing::warn!(
            key = %fallback.key,
            value = %fallback.value,
            reason = %fallback.reason,
            "ignoring config value, using the default"
        );
    }

    let server = match Bootstrap::new(cfg).with_tracing_slot(slot).bind().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "folio failed to start");
            return ExitCode::FAILURE;
        }
    };

    match server.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "folio stopped with an error");
            ExitCode::FAILURE
        }
    }
}
