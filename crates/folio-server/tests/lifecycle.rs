#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};

use opentelemetry::trace::{TraceContextExt, Tracer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use folio_core::error::FolioError;
use folio_server::config::{AppConfig, TelemetryConfig};
use folio_server::lifecycle::{Bootstrap, ShutdownGate};
use folio_server::telemetry::{DrainOutcome, PipelineState, TelemetryState, TracePipeline};

fn local_cfg() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.server.host = "127.0.0.1".into();
    cfg.server.port = 0;
    cfg.telemetry.drain_timeout_ms = 1000;
    cfg
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn gate_fires_once() {
    let gate = ShutdownGate::new();
    assert!(!gate.is_triggered());

    let waiter = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.wait().await })
    };

    assert!(gate.trigger());
    assert!(!gate.trigger());
    assert!(gate.clone().is_triggered());

    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    // Waiting after the fact resolves immediately.
    tokio::time::timeout(Duration::from_millis(100), gate.wait()).await.unwrap();
}

#[tokio::test]
async fn unconfigured_pipeline_has_nothing_to_drain() {
    let pipeline = TracePipeline::start(&TelemetryConfig::default());
    assert_eq!(pipeline.state(), PipelineState::Unconfigured);
    assert!(pipeline.tracer().is_none());
    assert!(pipeline.extract_context(&Default::default()).is_none());
    assert_eq!(
        pipeline.drain(Duration::from_secs(1)).await,
        DrainOutcome::NotRunning(PipelineState::Unconfigured)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn drain_against_unreachable_collector_is_bounded() {
    let cfg = TelemetryConfig {
        otlp_endpoint: Some("http://127.0.0.1:1".into()),
        ..TelemetryConfig::default()
    };
    let pipeline = TracePipeline::start(&cfg);
    assert_eq!(pipeline.state(), PipelineState::Running);

    let tracer = pipeline.tracer().unwrap();
    for i in 0..10 {
        tracer.in_span(format!("unit-{i}"), |_| {});
    }

    let timeout = Duration::from_millis(1000);
    let started = Instant::now();
    let outcome = pipeline.drain(timeout).await;
    assert!(started.elapsed() < timeout + Duration::from_millis(500), "{:?}", started.elapsed());
    // Nothing listens there, so the final batch cannot have been delivered.
    assert!(
        matches!(outcome, DrainOutcome::Failed(_) | DrainOutcome::TimedOut),
        "{outcome:?}"
    );
    assert_eq!(pipeline.state(), PipelineState::Stopped);

    // Second drain is a no-op.
    assert_eq!(
        pipeline.drain(timeout).await,
        DrainOutcome::NotRunning(PipelineState::Stopped)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn traceparent_is_extracted_while_running() {
    let cfg = TelemetryConfig {
        otlp_endpoint: Some("http://127.0.0.1:1".into()),
        ..TelemetryConfig::default()
    };
    let pipeline = TracePipeline::start(&cfg);

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        "traceparent",
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".parse().unwrap(),
    );
    let cx = pipeline.extract_context(&headers).expect("running pipeline extracts");
    assert_eq!(
        cx.span().span_context().trace_id().to_string(),
        "4bf92f3577b34da6a3ce929d0e0e4736"
    );
    assert!(cx.span().span_context().is_remote());

    pipeline.drain(Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_serves_until_the_gate_fires() {
    let server = Bootstrap::new(local_cfg()).bind().await.unwrap();
    let addr = server.local_addr();
    let gate = server.shutdown_gate();
    let running = tokio::spawn(server.run());

    let resp = http_get(addr, "/healthz").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
    let resp = http_get(addr, "/readyz").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");

    assert!(gate.trigger());
    let report = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run returns after the gate fires")
        .unwrap()
        .expect("clean shutdown");
    assert_eq!(report.traces, DrainOutcome::NotRunning(PipelineState::Unconfigured));
    assert!(!report.profiler_stopped);

    // The listener is closed.
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn draining_state_is_visible_to_readiness_and_metrics() {
    let server = Bootstrap::new(local_cfg()).bind().await.unwrap();
    let state = server.state().clone();
    let gate = server.shutdown_gate();
    let running = tokio::spawn(server.run());

    assert!(!state.is_draining());
    gate.trigger();
    assert!(state.is_draining());

    tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap().unwrap();
    assert_eq!(state.telemetry().metrics().draining.get(&[]).unwrap(), 1);
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut cfg = local_cfg();
    cfg.server.port = taken.local_addr().unwrap().port();

    let port = format!(":{}", cfg.server.port);

    match Bootstrap::new(cfg).bind().await {
        Err(FolioError::Bind { addr, .. }) => assert!(addr.ends_with(&port), "{addr}"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bind must fail while the port is taken"),
    }
    drop(taken);
}

#[tokio::test]
async fn unusable_listen_address_is_a_bind_error() {
    let mut cfg = local_cfg();
    // TEST-NET-1: never assigned to a local interface.
    cfg.server.host = "192.0.2.1".into();
    match Bootstrap::new(cfg).bind().await {
        Err(FolioError::Bind { addr, .. }) => assert_eq!(addr, "192.0.2.1:0"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("must fail"),
    }

    let mut cfg = local_cfg();
    cfg.server.host = " ".into();
    match Bootstrap::new(cfg).bind().await {
        Err(e) => assert_eq!(e.client_code().as_str(), "CONFIG"),
        Ok(_) => panic!("must fail"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn host_name_is_resolved_at_bind() {
    let mut cfg = local_cfg();
    cfg.server.host = "localhost".into();
    let server = Bootstrap::new(cfg).bind().await.expect("localhost resolves");
    let addr = server.local_addr();
    assert!(addr.ip().is_loopback(), "{addr}");
    let gate = server.shutdown_gate();
    let running = tokio::spawn(server.run());

    let resp = http_get(addr, "/healthz").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");

    gate.trigger();
    tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn telemetry_shutdown_respects_a_passed_deadline() {
    let cfg = TelemetryConfig {
        otlp_endpoint: Some("http://127.0.0.1:1".into()),
        ..TelemetryConfig::default()
    };
    let telemetry = TelemetryState::start(cfg).unwrap();
    let tracer = telemetry.pipeline().tracer().unwrap();
    for i in 0..10 {
        tracer.in_span(format!("late-{i}"), |_| {});
    }

    let started = Instant::now();
    let report = telemetry.shutdown_by(tokio::time::Instant::now()).await;
    assert!(started.elapsed() < Duration::from_millis(300), "{:?}", started.elapsed());
    assert_ne!(report.traces, DrainOutcome::Flushed);
    assert_eq!(telemetry.pipeline().state(), PipelineState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn whole_shutdown_fits_in_one_drain_timeout() {
    let mut cfg = local_cfg();
    cfg.telemetry.otlp_endpoint = Some("http://127.0.0.1:1".into());
    let grace = cfg.telemetry.drain_timeout();

    let server = Bootstrap::new(cfg).bind().await.unwrap();
    let addr = server.local_addr();
    let gate = server.shutdown_gate();
    let state = server.state().clone();
    let tracer = state.telemetry().pipeline().tracer().unwrap();
    let running = tokio::spawn(server.run());

    let resp = http_get(addr, "/api/books").await;
    assert!(resp.starts_with("HTTP/1.1 200"), "{resp}");
    for i in 0..10 {
        tracer.in_span(format!("pending-{i}"), |_| {});
    }

    let started = Instant::now();
    gate.trigger();
    let report = tokio::time::timeout(grace * 3, running)
        .await
        .expect("run returns")
        .unwrap()
        .expect("clean shutdown");
    assert!(
        started.elapsed() < grace + Duration::from_millis(500),
        "in-flight, trace and profiler phases share one deadline: {:?}",
        started.elapsed()
    );
    assert!(!matches!(report.traces, DrainOutcome::NotRunning(_)), "{:?}", report.traces);
    assert_eq!(state.telemetry().pipeline().state(), PipelineState::Stopped);
}

/// Runs the real binary so the process signal handlers are exercised.
#[cfg(unix)]
#[test]
fn sigterm_twice_exits_cleanly_within_the_drain_bound() {
    use std::io::{BufRead, BufReader};
    use std::process::{Command, Stdio};
    use std::sync::mpsc;

    let mut child = Command::new(env!("CARGO_BIN_EXE_folio-server"))
        .env_clear()
        .env("HOST", "127.0.0.1")
        .env("PORT", "0")
        .env("LOG_JSON", "true")
        .env("TELEMETRY_DRAIN_TIMEOUT_MS", "1000")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn folio-server");

    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    let reader = std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            let _ = tx.send(line);
        }
    });

    let ready = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    loop {
        let left = ready.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(line) => {
                let done = line.contains("accepting connections");
                seen.push(line);
                if done {
                    break;
                }
            }
            Err(_) => {
                let _ = child.kill();
                panic!("server never became ready: {seen:?}");
            }
        }
    }

    let pid = child.id().to_string();
    let kill = |pid: &str| Command::new("kill").args(["-TERM", pid]).status();
    assert!(kill(&pid).unwrap().success());
    // Usually lands mid-drain; must not change the outcome.
    let _ = kill(&pid);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if started.elapsed() > Duration::from_secs(5) {
            let _ = child.kill();
            panic!("server did not exit after SIGTERM");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(status.success(), "{status:?}");
    assert!(started.elapsed() < Duration::from_millis(1000 + 1000), "{:?}", started.elapsed());

    reader.join().unwrap();
    seen.extend(rx.try_iter());
    assert!(seen.iter().any(|l| l.contains("shutdown complete")), "{seen:?}");
}
