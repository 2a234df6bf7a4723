//! The eligibility engine.

use crate::user::TrackedItem;

/// Whether a subscription should be notified about an item now priced at
/// `price` with `stock` units available.
///
/// Depends on its three inputs only.
pub fn is_eligible(tracked: &TrackedItem, price: i64, stock: i64) -> bool {
  tracked.notification_enabled
    && price <= tracked.price_lower_threshold
    && stock > 0
}

/// Whether the price/stock transition reported by the merge engine warrants
/// reading subscriptions at all.
pub fn should_evaluate(price_changed: bool, stock: i64) -> bool {
  price_changed && stock > 0
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;

  fn tracked(enabled: bool, threshold: i64) -> TrackedItem {
    let now = Utc::now();
    TrackedItem {
      item_id:                  Uuid::new_v4(),
      price_lower_threshold:    threshold,
      notification_enabled:     enabled,
      notification_count:       0,
      notification_count_total: 0,
      last_notified_at:         None,
      created_at:               now,
      updated_at:               now,
    }
  }

  #[test]
  fn enabled_below_threshold_in_stock() {
    assert!(is_eligible(&tracked(true, 100_000), 90_000, 5));
  }

  #[test]
  fn out_of_stock_is_never_eligible() {
    assert!(!is_eligible(&tracked(true, 100_000), 90_000, 0));
  }

  #[test]
  fn disabled_is_never_eligible() {
    assert!(!is_eligible(&tracked(false, 100_000), 1, 5));
  }

  #[test]
  fn threshold_is_inclusive() {
    assert!(is_eligible(&tracked(true, 80_000), 80_000, 1));
    assert!(!is_eligible(&tracked(true, 80_000), 80_001, 1));
  }

  #[test]
  fn counters_do_not_affect_eligibility() {
    let mut ti = tracked(true, 100_000);
    ti.notification_count = 99;
    ti.last_notified_at = Some(Utc::now());
    assert!(is_eligible(&ti, 90_000, 5));
  }

  #[test]
  fn evaluation_gate() {
    assert!(should_evaluate(true, 3));
    assert!(!should_evaluate(true, 0));
    assert!(!should_evaluate(false, 3));
  }
}
