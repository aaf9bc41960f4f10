//! folio core: runtime-free primitives shared by the server and tooling.
//!
//! This crate defines the error surface and the origin trust decision. It
//! carries no transport or runtime dependencies so the policy can be
//! evaluated (and tested) anywhere.
//!
//! Panics, `unwrap`, and `expect` are compile-denied here.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod origin;

/// Shared result type.
pub use error::{ClientCode, FolioError, Result};
pub use origin::{OriginDecision, OriginPolicy};
