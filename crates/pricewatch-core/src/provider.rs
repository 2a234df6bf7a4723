//! Capabilities consumed from the outside world: site adapters that fetch
//! listings, and the push transport that delivers notifications.
//!
//! Both are called with no store transaction open. Request timeouts are the
//! implementation's responsibility.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{item::ExternalItem, site::Site};

// ─── Provider ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
  /// The listing is permanently gone (or delisted); don't retry it this
  /// cycle.
  #[error("item not found: {0}")]
  NotFound(String),

  /// Network or parse failure; retry on the next tick.
  #[error("transient provider failure: {0}")]
  Transient(String),

  /// No adapter is configured for this site.
  #[error("no provider for site {0}")]
  Unsupported(Site),
}

/// Fetches and normalises a product listing from its site.
pub trait Provider: Send + Sync {
  /// Whether this provider can fetch listings from `site`.
  fn supports(&self, site: Site) -> bool;

  /// Fetch the listing at a canonical product URL.
  fn fetch_item<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<ExternalItem, ProviderError>> + Send + 'a;
}

// ─── Notifier ────────────────────────────────────────────────────────────────

/// One push notification addressed to a batch of device tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
  pub tokens:  Vec<String>,
  pub title:   String,
  pub body:    String,
  pub item_id: Uuid,
}

/// Per-batch delivery counts reported by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
  pub success: u32,
  pub failure: u32,
}

#[derive(Debug, Error)]
pub enum NotifierError {
  #[error("push request failed: {0}")]
  Request(String),

  #[error("push transport rejected the batch: {0}")]
  Rejected(String),
}

/// Delivers a push message to every token in the batch.
pub trait Notifier: Send + Sync {
  fn send<'a>(
    &'a self,
    message: &'a PushMessage,
  ) -> impl Future<Output = Result<SendReport, NotifierError>> + Send + 'a;
}
