//! The merge engine: folds a freshly fetched listing into the persisted item.

use chrono::{DateTime, Utc};

use crate::item::{ExternalItem, Item, stored_precision};

/// Result of [`merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
  pub item:          Item,
  pub price_changed: bool,
  pub stock_changed: bool,
}

/// Fold `fetched` into `current` as observed at `now`.
///
/// The price extrema are widened to include the new price, so the invariant
/// `lowest <= price <= highest` holds after every merge even if the stored
/// extrema were inconsistent. Identity, URL and name are left untouched.
pub fn merge(
  current: &Item,
  fetched: &ExternalItem,
  now: DateTime<Utc>,
) -> MergeOutcome {
  let now = stored_precision(now);
  let mut item = current.clone();
  let price_changed = fetched.price != current.price;
  let stock_changed = fetched.stock != current.stock;

  if price_changed {
    item.price_history_previous = current.price;
    item.price = fetched.price;
    item.price_last_changed_at = now;
  }
  item.price_history_highest = item.price_history_highest.max(item.price);
  item.price_history_lowest = item.price_history_lowest.min(item.price);

  item.stock = fetched.stock;
  item.image_url = fetched.image_url.clone();
  item.description = fetched.description.clone();
  item.rating = fetched.rating;
  item.sold_count = fetched.sold_count;
  item.updated_at = now;
  debug_assert!(item.extrema_hold());

  MergeOutcome { item, price_changed, stock_changed }
}
