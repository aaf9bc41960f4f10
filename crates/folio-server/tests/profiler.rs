#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use folio_server::config::{AppConfig, TelemetryConfig};
use folio_server::lifecycle::Bootstrap;
use folio_server::telemetry::{ProfilerAgent, TelemetryState};

// Nothing listens on port 1, so every upload is refused.
const UNREACHABLE: &str = "http://127.0.0.1:1";

fn profiled_telemetry() -> TelemetryConfig {
    let mut cfg = TelemetryConfig::default();
    cfg.profiler.server_address = Some(UNREACHABLE.into());
    cfg.profiler.basic_auth_user = Some("folio".into());
    cfg.profiler.basic_auth_token = Some("token".into());
    cfg.drain_timeout_ms = 1000;
    cfg
}

#[tokio::test]
async fn unconfigured_profiler_is_a_no_op() {
    let agent = ProfilerAgent::start(&TelemetryConfig::default());
    assert!(!agent.is_running());
    assert!(!agent.stop(Duration::from_secs(1)).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_profiler_does_not_block_listening() {
    let mut cfg = AppConfig::default();
    cfg.server.host = "127.0.0.1".into();
    cfg.server.port = 0;
    cfg.telemetry = profiled_telemetry();
    let grace = cfg.telemetry.drain_timeout();

    let server = tokio::time::timeout(Duration::from_secs(5), Bootstrap::new(cfg).bind())
        .await
        .expect("bind is not held up by the profiler")
        .expect("profiler failures never fail the boot");
    let addr = server.local_addr();
    let gate = server.shutdown_gate();
    let running = tokio::spawn(server.run());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET /healthz HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut resp = String::new();
    stream.read_to_string(&mut resp).await.unwrap();
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");

    let started = Instant::now();
    gate.trigger();
    tokio::time::timeout(grace * 3, running)
        .await
        .expect("run returns")
        .unwrap()
        .expect("clean shutdown");
    assert!(started.elapsed() < grace + Duration::from_millis(500), "{:?}", started.elapsed());
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_bounded_and_runs_once() {
    let cfg = profiled_telemetry();
    let agent = ProfilerAgent::start(&cfg);

    let timeout = Duration::from_millis(500);
    let started = Instant::now();
    agent.stop(timeout).await;
    assert!(started.elapsed() < timeout + Duration::from_millis(500), "{:?}", started.elapsed());
    assert!(!agent.is_running());

    // Whatever the first stop managed, the agent is gone now.
    let started = Instant::now();
    assert!(!agent.stop(timeout).await);
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[tokio::test(flavor = "multi_thread")]
async fn traces_and_profiler_share_one_deadline() {
    let mut cfg = profiled_telemetry();
    cfg.otlp_endpoint = Some(UNREACHABLE.into());
    let telemetry = TelemetryState::start(cfg).unwrap();

    let budget = Duration::from_millis(400);
    let started = Instant::now();
    telemetry.shutdown_by(tokio::time::Instant::now() + budget).await;
    assert!(
        started.elapsed() < budget + Duration::from_millis(300),
        "drain and stop ran past the deadline: {:?}",
        started.elapsed()
    );
    assert!(!telemetry.profiler().is_running());
}
