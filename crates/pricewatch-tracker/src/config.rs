//! Runtime configuration, deserialised from `config.toml` and
//! `PRICEWATCH__*` environment variables.

use std::{path::PathBuf, time::Duration};

use pricewatch_core::site::Site;
use serde::Deserialize;

use crate::{Error, Result};

/// Shortest refresh interval accepted for a site loop.
pub const MIN_FETCH_INTERVAL_SECS: u64 = 10;

// ─── Tracker ──────────────────────────────────────────────────────────────────

/// Knobs for the refresh pipeline and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  /// Period of each site loop.
  pub fetch_interval_secs: u64,
  /// Fixed pause between two items of the same site.
  pub item_delay_ms:       u64,
  /// Upper bound of the uniform jitter added to `item_delay_ms`.
  pub max_jitter_ms:       u64,
  /// Start offset per site, indexed by [`Site::ordinal`]. Missing entries
  /// start immediately.
  pub site_offsets_secs:   Vec<u64>,
  /// Skip subscriptions notified this many times since their last reset.
  pub notification_cap:    Option<u32>,
  /// Characters of the product name kept in the push title.
  pub title_name_limit:    usize,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      fetch_interval_secs: 600,
      item_delay_ms:       1_000,
      max_jitter_ms:       10_000,
      site_offsets_secs:   vec![0, 3, 8],
      notification_cap:    None,
      title_name_limit:    45,
    }
  }
}

impl TrackerConfig {
  pub fn validate(&self) -> Result<()> {
    if self.fetch_interval_secs < MIN_FETCH_INTERVAL_SECS {
      return Err(Error::Config(format!(
        "fetch_interval_secs must be at least {MIN_FETCH_INTERVAL_SECS}, got {}",
        self.fetch_interval_secs
      )));
    }
    if self.title_name_limit == 0 {
      return Err(Error::Config("title_name_limit must be positive".into()));
    }
    Ok(())
  }

  pub fn fetch_interval(&self) -> Duration {
    Duration::from_secs(self.fetch_interval_secs)
  }

  pub fn item_delay(&self) -> Duration { Duration::from_millis(self.item_delay_ms) }

  pub fn site_offset(&self, site: Site) -> Duration {
    let secs = self
      .site_offsets_secs
      .get(site.ordinal())
      .copied()
      .unwrap_or_default();
    Duration::from_secs(secs)
  }
}

// ─── Application ──────────────────────────────────────────────────────────────

/// Everything the `pricewatch` binary needs to assemble a [`crate::Tracker`].
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  pub store_path:           PathBuf,
  /// Legacy FCM server key; required by `pricewatch run`.
  #[serde(default)]
  pub fcm_key:              Option<String>,
  #[serde(default = "default_fcm_endpoint")]
  pub fcm_endpoint:         String,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
  #[serde(default = "default_shopee_base_url")]
  pub shopee_base_url:      String,
  #[serde(default)]
  pub tracker:              TrackerConfig,
}

fn default_fcm_endpoint() -> String { "https://fcm.googleapis.com/fcm/send".into() }

fn default_request_timeout_secs() -> u64 { 15 }

fn default_shopee_base_url() -> String { "https://shopee.co.id".into() }

impl AppConfig {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}
