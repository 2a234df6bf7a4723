//! SQLite backend for the pricewatch item, history and subscription stores.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;
mod subscriptions;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
