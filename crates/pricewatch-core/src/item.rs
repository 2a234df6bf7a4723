//! Item types: one persisted row per distinct product listing.
//!
//! An item is identified by its `(site, merchant_id, product_id)` triple and
//! is refreshed in place by the merge engine. Prices are whole currency units
//! (rupiah).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::site::Site;

/// Truncate `at` to the microsecond precision timestamps are stored with, so
/// an item built in memory compares equal to the row read back.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> { at.trunc_subsecs(6) }

// ─── Identity ────────────────────────────────────────────────────────────────

/// The triple that uniquely names a product across refetches. Immutable once
/// an item is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
  pub site:        Site,
  pub merchant_id: String,
  pub product_id:  String,
}

// ─── ExternalItem ────────────────────────────────────────────────────────────

/// A freshly fetched, normalised listing as returned by a provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalItem {
  pub site:        Site,
  pub merchant_id: String,
  pub product_id:  String,
  /// Canonical product URL, suitable for refetching.
  pub url:         String,
  pub name:        String,
  pub price:       i64,
  pub stock:       i64,
  pub image_url:   String,
  pub description: String,
  pub rating:      f64,
  pub sold_count:  i64,
}

impl ExternalItem {
  pub fn identity(&self) -> Identity {
    Identity {
      site:        self.site,
      merchant_id: self.merchant_id.clone(),
      product_id:  self.product_id.clone(),
    }
  }
}

// ─── Item ────────────────────────────────────────────────────────────────────

/// A persisted product listing.
///
/// Invariant: `price_history_lowest <= price <= price_history_highest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
  pub item_id:                Uuid,
  pub site:                   Site,
  pub merchant_id:            String,
  pub product_id:             String,
  pub url:                    String,
  pub name:                   String,
  pub price:                  i64,
  pub stock:                  i64,
  pub image_url:              String,
  pub description:            String,
  pub rating:                 f64,
  pub sold_count:             i64,
  /// The price that was superseded by the most recent price change.
  pub price_history_previous: i64,
  pub price_history_highest:  i64,
  pub price_history_lowest:   i64,
  pub price_last_changed_at:  DateTime<Utc>,
  pub created_at:             DateTime<Utc>,
  pub updated_at:             DateTime<Utc>,
}

impl Item {
  /// Build a brand-new item from its first observation. Both extrema start at
  /// the first observed price.
  pub fn from_external(fetched: &ExternalItem, now: DateTime<Utc>) -> Self {
    let now = stored_precision(now);
    Self {
      item_id:                Uuid::new_v4(),
      site:                   fetched.site,
      merchant_id:            fetched.merchant_id.clone(),
      product_id:             fetched.product_id.clone(),
      url:                    fetched.url.clone(),
      name:                   fetched.name.clone(),
      price:                  fetched.price,
      stock:                  fetched.stock,
      image_url:              fetched.image_url.clone(),
      description:            fetched.description.clone(),
      rating:                 fetched.rating,
      sold_count:             fetched.sold_count,
      price_history_previous: fetched.price,
      price_history_highest:  fetched.price,
      price_history_lowest:   fetched.price,
      price_last_changed_at:  now,
      created_at:             now,
      updated_at:             now,
    }
  }

  pub fn identity(&self) -> Identity {
    Identity {
      site:        self.site,
      merchant_id: self.merchant_id.clone(),
      product_id:  self.product_id.clone(),
    }
  }

  /// Whether the extrema invariant holds.
  pub fn extrema_hold(&self) -> bool {
    self.price_history_lowest <= self.price
      && self.price <= self.price_history_highest
  }
}
