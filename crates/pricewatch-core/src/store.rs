//! Store contracts and their outcome types.
//!
//! The traits are implemented by storage backends (e.g.
//! `pricewatch-store-sqlite`). The tracker depends on these abstractions, not
//! on any concrete backend.
//!
//! No in-process locking is assumed anywhere: the background scheduler and
//! foreground requests may touch the same item concurrently, and every
//! cross-writer guarantee comes from the atomic primitives below
//! (unique-key insert, compare-and-swap replace, single-call multi-user
//! increment).
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  history::ItemHistory,
  item::{Identity, Item},
  site::Site,
  user::{NewTrackedItem, Subscriber, User},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of [`ItemStore::insert_item`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
  /// The item was new and has been stored as given.
  Inserted(Item),
  /// Another writer already stored this identity; its row is returned
  /// unchanged.
  Existing(Item),
}

impl InsertOutcome {
  pub fn into_item(self) -> Item {
    match self {
      Self::Inserted(item) | Self::Existing(item) => item,
    }
  }
}

/// Result of [`ItemStore::replace_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
  Replaced,
  /// The stored row no longer carries the expected `updated_at` (a concurrent
  /// writer got there first) or no longer exists.
  NotModified,
}

/// Result of [`SubscriptionStore::upsert_tracked_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  Created,
  Updated,
  /// The user already tracks the maximum number of distinct items.
  LimitReached,
  UserNotFound,
}

// ─── Item store ──────────────────────────────────────────────────────────────

pub trait ItemStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Look an item up by its identity triple.
  fn find_by_identity<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<Option<Item>, Self::Error>> + Send + 'a;

  fn get_item(
    &self,
    item_id: Uuid,
  ) -> impl Future<Output = Result<Option<Item>, Self::Error>> + Send + '_;

  /// Insert `item`, or return the row already stored under its identity.
  fn insert_item(
    &self,
    item: Item,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + '_;

  /// Overwrite every mutable field of the stored item, provided its
  /// `updated_at` still equals `expected_updated_at`.
  fn replace_item<'a>(
    &'a self,
    item: &'a Item,
    expected_updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<ReplaceOutcome, Self::Error>> + Send + 'a;

  /// Every item on `site`. Not transactional.
  fn list_items_by_site(
    &self,
    site: Site,
  ) -> impl Future<Output = Result<Vec<Item>, Self::Error>> + Send + '_;
}

// ─── History store ───────────────────────────────────────────────────────────

pub trait HistoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append one snapshot. Never overwrites; rejects a reused `history_id`.
  /// A `recorded_at` older than the newest record for the item is raised to
  /// that record's stamp, keeping each item's history non-decreasing.
  fn append_history(
    &self,
    entry: ItemHistory,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Snapshots for `item_id` with `start <= recorded_at <= end`, newest
  /// first.
  fn history_range(
    &self,
    item_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ItemHistory>, Self::Error>> + Send + '_;
}

// ─── Subscription store ──────────────────────────────────────────────────────

pub trait SubscriptionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  fn add_user(
    &self,
    name: String,
    email: String,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Load a user with devices (most recently seen first) and tracked items
  /// (most recently updated first).
  fn get_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  // ── Devices ───────────────────────────────────────────────────────────

  /// Register (or re-register) a device as seen now, then trim the user's
  /// devices to the most recently seen [`crate::user::MAX_DEVICES`].
  /// Returns `false` if the user does not exist.
  fn add_device(
    &self,
    user_id: Uuid,
    device_id: String,
    push_token: Option<String>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Set or clear a device's push token. Returns `false` if no such device.
  fn set_push_token(
    &self,
    user_id: Uuid,
    device_id: String,
    push_token: Option<String>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn remove_device(
    &self,
    user_id: Uuid,
    device_id: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// Update the user's subscription to `input.item_id` (resetting its
  /// notification count) or insert a new one, atomically.
  fn upsert_tracked_item(
    &self,
    user_id: Uuid,
    input: NewTrackedItem,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  fn remove_tracked_item(
    &self,
    user_id: Uuid,
    item_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Every user subscribed to `item_id`, each with only the matching
  /// subscription and the push tokens of their devices.
  fn find_users_tracking_item(
    &self,
    item_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Subscriber>, Self::Error>> + Send + '_;

  /// In one atomic call, bump `notification_count` and
  /// `notification_count_total` and set `last_notified_at` on each listed
  /// user's subscription to `item_id`.
  ///
  /// Users already credited for `dispatch_id` are skipped, making retries of
  /// the same dispatch idempotent. Returns the number of users modified.
  fn increment_notification_counters(
    &self,
    user_ids: Vec<Uuid>,
    item_id: Uuid,
    dispatch_id: String,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
