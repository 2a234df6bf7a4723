//! The pricewatch refresh pipeline.
//!
//! A [`Tracker`] ties a store, a site [`Provider`] and a push [`Notifier`]
//! together. The scheduler drives it per site in the background; the
//! foreground path (`check_url`, `track_url`) runs the same merge and fan-out
//! for user requests. No in-process locks are held: every cross-writer
//! guarantee comes from the store contracts in [`pricewatch_core::store`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod fcm;
pub mod foreground;
pub mod pipeline;
pub mod scheduler;
pub mod shopee;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use pricewatch_core::{
  provider::{Notifier, Provider},
  store::{HistoryStore, ItemStore, SubscriptionStore},
};

pub use config::{AppConfig, TrackerConfig};
pub use error::{Error, Result};
pub use fanout::{NotificationOutcome, Reconciliation, SkipReason};
pub use foreground::{Tracked, check_url};
pub use pipeline::RefreshReport;
pub use scheduler::TickSummary;

// ─── Store bundle ─────────────────────────────────────────────────────────────

/// Everything the pipeline needs from storage.
pub trait TrackerStore: ItemStore + HistoryStore + SubscriptionStore {}

impl<T> TrackerStore for T where T: ItemStore + HistoryStore + SubscriptionStore {}

// ─── Tracker ──────────────────────────────────────────────────────────────────

/// Shared handle to the pipeline. Cloning is cheap; every site loop holds one.
pub struct Tracker<S, P, N> {
  store:    Arc<S>,
  provider: Arc<P>,
  notifier: Arc<N>,
  config:   Arc<TrackerConfig>,
}

impl<S, P, N> Clone for Tracker<S, P, N> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      provider: Arc::clone(&self.provider),
      notifier: Arc::clone(&self.notifier),
      config:   Arc::clone(&self.config),
    }
  }
}

impl<S, P, N> Tracker<S, P, N>
where
  S: TrackerStore,
  P: Provider,
  N: Notifier,
{
  /// Assemble a tracker, rejecting an invalid configuration.
  pub fn new(store: S, provider: P, notifier: N, config: TrackerConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      store:    Arc::new(store),
      provider: Arc::new(provider),
      notifier: Arc::new(notifier),
      config:   Arc::new(config),
    })
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn provider(&self) -> &P { &self.provider }

  pub fn notifier(&self) -> &N { &self.notifier }

  pub fn config(&self) -> &TrackerConfig { &self.config }
}
