//! Users, their push devices and their item subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Most devices kept per user; the least recently seen is evicted first.
pub const MAX_DEVICES: usize = 5;

/// Most distinct items a user may track.
pub const MAX_TRACKED_ITEMS: usize = 25;

/// Aggregate root for a user's devices and subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:       Uuid,
  pub name:          String,
  pub email:         String,
  /// Most recently seen first; at most [`MAX_DEVICES`].
  pub devices:       Vec<Device>,
  /// Most recently updated first; at most [`MAX_TRACKED_ITEMS`].
  pub tracked_items: Vec<TrackedItem>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl User {
  /// The subscription for `item_id`, if any.
  pub fn tracked_item(&self, item_id: Uuid) -> Option<&TrackedItem> {
    self.tracked_items.iter().find(|ti| ti.item_id == item_id)
  }
}

/// A registered client device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
  pub device_id:  String,
  /// Push registration token; absent until the client reports one, or after
  /// logout.
  pub push_token: Option<String>,
  pub last_seen:  DateTime<Utc>,
  pub created_at: DateTime<Utc>,
}

/// A user's subscription to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
  pub item_id:                  Uuid,
  pub price_lower_threshold:    i64,
  pub notification_enabled:     bool,
  /// Notifications sent since the subscription was last (re)configured.
  pub notification_count:       u32,
  pub notification_count_total: u32,
  pub last_notified_at:         Option<DateTime<Utc>>,
  pub created_at:               DateTime<Utc>,
  pub updated_at:               DateTime<Utc>,
}

/// Input to [`crate::store::SubscriptionStore::upsert_tracked_item`].
/// Counters and timestamps are always managed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrackedItem {
  pub item_id:               Uuid,
  pub price_lower_threshold: i64,
  pub notification_enabled:  bool,
}

/// Projection returned by
/// [`crate::store::SubscriptionStore::find_users_tracking_item`]: one user,
/// the matching subscription only, and the user's non-empty push tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
  pub user_id:      Uuid,
  pub tracked_item: TrackedItem,
  pub push_tokens:  Vec<String>,
}
