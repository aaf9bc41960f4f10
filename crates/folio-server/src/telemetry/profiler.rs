//! Continuous CPU profiler shipping to a Pyroscope server.
//!
//! Strictly best-effort: an absent address disables it, any setup error is
//! logged and swallowed. Sampling runs on the agent's own threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::TelemetryConfig;

use super::run_bounded;

#[cfg(feature = "profiling")]
type RunningAgent = pyroscope::PyroscopeAgent<pyroscope::pyroscope::PyroscopeAgentRunning>;

#[cfg(not(feature = "profiling"))]
type RunningAgent = ();

pub struct ProfilerAgent {
    agent: Mutex<Option<RunningAgent>>,
    running: AtomicBool,
}

impl ProfilerAgent {
    pub fn disabled() -> Self {
        Self {
            agent: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(cfg: &TelemetryConfig) -> Self {
        let Some(address) = cfg.profiler.server_address.as_deref() else {
            tracing::info!("PYROSCOPE_URL not set, skipping profiling");
            return Self::disabled();
        };

        match start_agent(cfg, address) {
            Ok(agent) => {
                tracing::info!(app = %cfg.profiler.app_name, %address, "profiling initialized");
                Self {
                    agent: Mutex::new(Some(agent)),
                    running: AtomicBool::new(true),
                }
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "failed to initialize profiling");
                Self::disabled()
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop sampling and flush the last report, waiting at most `timeout`.
    /// Returns whether a running agent was stopped cleanly.
    pub async fn stop(&self, timeout: Duration) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        let Some(agent) = self.agent.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return false;
        };

        match run_bounded("profiler-stop", timeout, move || stop_agent(agent)).await {
            Ok(Ok(())) => {
                tracing::info!("profiler stopped");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "profiler stop failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "profiler stop abandoned");
                false
            }
        }
    }
}

#[cfg(feature = "profiling")]
fn start_agent(cfg: &TelemetryConfig, address: &str) -> Result<RunningAgent, String> {
    use pyroscope::PyroscopeAgent;
    use pyroscope_pprofrs::{pprof_backend, PprofConfig};

    let p = &cfg.profiler;
    let backend = pprof_backend(PprofConfig::new().sample_rate(p.sample_rate));

    let mut builder = PyroscopeAgent::builder(address, p.app_name.as_str())
        .backend(backend)
        .tags(vec![
            ("environment", cfg.environment.as_str()),
            ("version", cfg.service_version.as_str()),
        ]);
    if let (Some(user), Some(token)) = (&p.basic_auth_user, &p.basic_auth_token) {
        builder = builder.basic_auth(user, token);
    }

    let agent = builder.build().map_err(|e| e.to_string())?;
    agent.start().map_err(|e| e.to_string())
}

#[cfg(feature = "profiling")]
fn stop_agent(agent: RunningAgent) -> Result<(), String> {
    let ready = agent.stop().map_err(|e| e.to_string())?;
    ready.shutdown();
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn start_agent(_cfg: &TelemetryConfig, _address: &str) -> Result<RunningAgent, String> {
    Err("built without the `profiling` feature".into())
}

#[cfg(not(feature = "profiling"))]
fn stop_agent(_agent: RunningAgent) -> Result<(), String> {
    Ok(())
}
