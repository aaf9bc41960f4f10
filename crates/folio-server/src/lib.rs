//! folio server library entry.
//!
//! Wires config, telemetry (logging, trace export, profiling, metrics), the
//! origin gate, and the catalog routes into one axum service. Consumed by
//! the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod catalog;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;
pub mod telemetry;
