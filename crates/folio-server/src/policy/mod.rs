//! Request admission policy.
//!
//! The origin rules themselves live in `folio_core::origin`; this module
//! applies them to HTTP traffic.

pub mod cors;

pub use cors::origin_gate;
pub use folio_core::origin::{OriginDecision, OriginPolicy};
