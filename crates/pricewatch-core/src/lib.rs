//! Core types and trait definitions for the pricewatch tracker.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The merge and eligibility engines are pure functions; everything that
//! touches the outside world (stores, site adapters, push transport) is a
//! trait implemented elsewhere.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod eligibility;
pub mod error;
pub mod history;
pub mod item;
pub mod merge;
pub mod provider;
pub mod site;
pub mod store;
pub mod user;

pub use error::{Error, Result};
