//! Append-only price/stock history.
//!
//! One snapshot is recorded per successful fetch, whether or not anything
//! changed: the history is a sampling ledger, not a delta ledger. Records are
//! never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::{Item, stored_precision};

/// A single sample of an item's price and stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemHistory {
  pub history_id:  Uuid,
  /// Non-owning reference to the sampled item.
  pub item_id:     Uuid,
  pub price:       i64,
  pub stock:       i64,
  pub rating:      f64,
  pub sold_count:  i64,
  pub recorded_at: DateTime<Utc>,
}

impl ItemHistory {
  /// Snapshot the current state of `item` at `at`.
  pub fn sample(item: &Item, at: DateTime<Utc>) -> Self {
    Self {
      history_id:  Uuid::new_v4(),
      item_id:     item.item_id,
      price:       item.price,
      stock:       item.stock,
      rating:      item.rating,
      sold_count:  item.sold_count,
      recorded_at: stored_precision(at),
    }
  }
}
