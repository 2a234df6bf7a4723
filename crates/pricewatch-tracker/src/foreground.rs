//! The foreground path: a user checks or starts tracking a product URL.
//!
//! Runs concurrently with the scheduler against the same store. New items go
//! through insert-or-get-existing; known items take the same merge and
//! fan-out path as a scheduled refresh.

use chrono::Utc;
use pricewatch_core::{
  history::ItemHistory,
  item::{ExternalItem, Item},
  provider::{Notifier, Provider, ProviderError},
  site::classify,
  store::{InsertOutcome, ItemStore, SubscriptionStore, UpsertOutcome},
  user::NewTrackedItem,
};
use tracing::info;
use uuid::Uuid;

use crate::{Error, Result, Tracker, TrackerStore};

/// Result of [`Tracker::track_url`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
  pub item:         Item,
  /// Whether this request created the item.
  pub created_item: bool,
  /// [`UpsertOutcome::Created`] or [`UpsertOutcome::Updated`].
  pub subscription: UpsertOutcome,
}

/// Classify `url` and fetch its listing, writing nothing.
pub async fn check_url<P: Provider>(provider: &P, url: &str) -> Result<ExternalItem> {
  let site_url = classify(url)?;
  if !provider.supports(site_url.site) {
    return Err(ProviderError::Unsupported(site_url.site).into());
  }
  Ok(provider.fetch_item(&site_url.canonical).await?)
}

impl<S, P, N> Tracker<S, P, N>
where
  S: TrackerStore,
  P: Provider,
  N: Notifier,
{
  pub async fn check_url(&self, url: &str) -> Result<ExternalItem> {
    check_url(self.provider.as_ref(), url).await
  }

  /// Fetch `url`, store or refresh its item, and subscribe `user_id` to it.
  pub async fn track_url(
    &self,
    user_id:               Uuid,
    url:                   &str,
    price_lower_threshold: i64,
    notification_enabled:  bool,
  ) -> Result<Tracked> {
    let fetched = self.check_url(url).await?;
    let (item, created_item) = self.upsert_item(&fetched).await?;

    let input = NewTrackedItem {
      item_id: item.item_id,
      price_lower_threshold,
      notification_enabled,
    };
    let subscription = match self
      .store
      .upsert_tracked_item(user_id, input)
      .await
      .map_err(Error::store)?
    {
      UpsertOutcome::UserNotFound => return Err(Error::UserNotFound(user_id)),
      UpsertOutcome::LimitReached => return Err(Error::TrackedItemLimit(user_id)),
      outcome => outcome,
    };

    info!(%user_id, item_id = %item.item_id, created_item, "item tracked");
    Ok(Tracked { item, created_item, subscription })
  }

  /// Store a freshly fetched listing, or merge it into the item already
  /// stored under its identity. Either way exactly one history sample is
  /// appended. Returns the item and whether it was created.
  pub async fn upsert_item(&self, fetched: &ExternalItem) -> Result<(Item, bool)> {
    let existing = self
      .store
      .find_by_identity(&fetched.identity())
      .await
      .map_err(Error::store)?;
    if let Some(current) = existing {
      return Ok((self.apply_fetch(&current, fetched).await.item, false));
    }

    let fresh = Item::from_external(fetched, Utc::now());
    match self.store.insert_item(fresh).await.map_err(Error::store)? {
      InsertOutcome::Inserted(item) => {
        self
          .record_history(ItemHistory::sample(&item, item.created_at))
          .await;
        Ok((item, true))
      }
      // Lost the insert race to a concurrent writer: refresh its row instead.
      InsertOutcome::Existing(current) => {
        Ok((self.apply_fetch(&current, fetched).await.item, false))
      }
    }
  }
}
