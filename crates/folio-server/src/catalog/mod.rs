//! Book and quote catalog exposed under `/api`.
//!
//! Handlers only talk to a [`CatalogStore`]; the in-memory store stands in
//! for a database and [`MeteredStore`] times every query into
//! `database_query_duration_seconds`.

pub mod handlers;
pub mod model;
pub mod store;

pub use handlers::routes;
pub use model::{Book, BookPatch, NewBook, NewQuote, Quote};
pub use store::{CatalogStore, InMemoryCatalogStore, MeteredStore};
