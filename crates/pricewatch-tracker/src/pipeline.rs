//! One refresh of one item: fetch, merge, persist, sample, fan out.

use chrono::Utc;
use pricewatch_core::{
  eligibility::should_evaluate,
  history::ItemHistory,
  item::{ExternalItem, Item},
  merge::{MergeOutcome, merge},
  provider::{Notifier, Provider},
  store::{HistoryStore, ItemStore, ReplaceOutcome, SubscriptionStore},
};
use tracing::{debug, error, info, warn};

use crate::{
  Result, Tracker, TrackerStore,
  dispatch::dispatch_id,
  fanout::{
    NotificationOutcome, Reconciliation, SkipReason, build_message, reconcile,
    select_recipients,
  },
};

/// What [`Tracker::process_item`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
  /// The merged item, as written (or as it would have been written).
  pub item:             Item,
  pub price_changed:    bool,
  pub stock_changed:    bool,
  /// Whether the item write landed.
  pub persisted:        bool,
  pub history_recorded: bool,
  pub notification:     NotificationOutcome,
}

impl<S, P, N> Tracker<S, P, N>
where
  S: TrackerStore,
  P: Provider,
  N: Notifier,
{
  /// Refetch `item` from its site and run it through the pipeline.
  ///
  /// Only the fetch can fail: store and notifier failures after a successful
  /// fetch are logged and reported in the [`RefreshReport`], never returned.
  pub async fn process_item(&self, item: &Item) -> Result<RefreshReport> {
    let fetched = self.provider.fetch_item(&item.url).await?;
    Ok(self.apply_fetch(item, &fetched).await)
  }

  /// Fold an already fetched listing into `current` and run the rest of the
  /// pipeline.
  pub async fn apply_fetch(&self, current: &Item, fetched: &ExternalItem) -> RefreshReport {
    let (merged, persisted) = self.merge_and_store(current, fetched).await;
    let item = merged.item;

    let history_recorded = self
      .record_history(ItemHistory::sample(&item, item.updated_at))
      .await;

    let notification = if !persisted {
      NotificationOutcome::Skipped(SkipReason::NotPersisted)
    } else if should_evaluate(merged.price_changed, item.stock) {
      self.notify_price_drop(&item).await
    } else if !merged.price_changed {
      NotificationOutcome::Skipped(SkipReason::PriceUnchanged)
    } else {
      NotificationOutcome::Skipped(SkipReason::OutOfStock)
    };

    RefreshReport {
      item,
      price_changed: merged.price_changed,
      stock_changed: merged.stock_changed,
      persisted,
      history_recorded,
      notification,
    }
  }

  /// Merge and compare-and-swap the result in. On a lost race the winner's
  /// row is reloaded and merged once more.
  async fn merge_and_store(&self, current: &Item, fetched: &ExternalItem) -> (MergeOutcome, bool) {
    let first = merge(current, fetched, Utc::now());
    match self.store.replace_item(&first.item, current.updated_at).await {
      Ok(ReplaceOutcome::Replaced) => return (first, true),
      Ok(ReplaceOutcome::NotModified) => {
        debug!(item_id = %current.item_id, "item changed concurrently, re-merging");
      }
      Err(e) => {
        error!(item_id = %current.item_id, error = %e, "failed to write item");
        return (first, false);
      }
    }

    let fresh = match self.store.get_item(current.item_id).await {
      Ok(Some(fresh)) => fresh,
      Ok(None) => {
        warn!(item_id = %current.item_id, "item vanished during refresh");
        return (first, false);
      }
      Err(e) => {
        error!(item_id = %current.item_id, error = %e, "failed to reload item");
        return (first, false);
      }
    };

    let second = merge(&fresh, fetched, Utc::now());
    match self.store.replace_item(&second.item, fresh.updated_at).await {
      Ok(ReplaceOutcome::Replaced) => (second, true),
      Ok(ReplaceOutcome::NotModified) => {
        warn!(item_id = %current.item_id, "item write lost twice, leaving it for the next tick");
        (second, false)
      }
      Err(e) => {
        error!(item_id = %current.item_id, error = %e, "failed to write item");
        (second, false)
      }
    }
  }

  pub(crate) async fn record_history(&self, entry: ItemHistory) -> bool {
    let item_id = entry.item_id;
    match self.store.append_history(entry).await {
      Ok(()) => true,
      Err(e) => {
        error!(%item_id, error = %e, "failed to append history");
        false
      }
    }
  }

  /// Select recipients for `item`'s new price, send one batch, and credit
  /// the users it went to.
  pub async fn notify_price_drop(&self, item: &Item) -> NotificationOutcome {
    let subscribers = match self.store.find_users_tracking_item(item.item_id).await {
      Ok(subscribers) => subscribers,
      Err(e) => {
        error!(item_id = %item.item_id, error = %e, "failed to load subscribers");
        return NotificationOutcome::Skipped(SkipReason::LookupFailed);
      }
    };

    let recipients = select_recipients(
      &subscribers,
      item.price,
      item.stock,
      self.config.notification_cap,
    );
    if recipients.is_empty() {
      debug!(item_id = %item.item_id, subscribers = subscribers.len(), "no users to notify");
      return NotificationOutcome::Skipped(SkipReason::NoRecipients);
    }

    let users = recipients.user_ids.len();
    let tokens = recipients.tokens.len();
    let message = build_message(item, recipients.tokens, self.config.title_name_limit);

    info!(item_id = %item.item_id, users, tokens, "sending price drop notification");
    let report = match self.notifier.send(&message).await {
      Ok(report) => report,
      Err(e) => {
        error!(item_id = %item.item_id, users, error = %e, "failed to send notification");
        return NotificationOutcome::DispatchFailed { recipients: users };
      }
    };
    info!(
      item_id = %item.item_id,
      success = report.success,
      failure = report.failure,
      "notification sent"
    );

    let reconciliation = match self
      .store
      .increment_notification_counters(recipients.user_ids, item.item_id, dispatch_id(item))
      .await
    {
      Ok(modified) => reconcile(users, modified),
      Err(e) => {
        error!(item_id = %item.item_id, error = %e, "failed to increment notification counters");
        Reconciliation::Failed
      }
    };
    if let Reconciliation::Mismatch { submitted, modified } = reconciliation {
      error!(item_id = %item.item_id, submitted, modified, "notification counter mismatch");
    }

    NotificationOutcome::Dispatched {
      recipients: users,
      tokens,
      report,
      reconciliation,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use pricewatch_core::{
    provider::ProviderError,
    store::{HistoryStore, ItemStore, SubscriptionStore},
  };

  use super::*;
  use crate::{
    Error, TrackerConfig,
    testing::{listing, quick_config, seed_item, subscribe, tracker},
  };

  #[tokio::test]
  async fn price_drop_updates_extrema_and_notifies_eligible_users() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    let keen = subscribe(&t, &item, 90_000, &["keen-phone"]).await;
    let picky = subscribe(&t, &item, 70_000, &["picky-phone"]).await;
    t.provider().push(&item.url, Ok(listing(80_000, 3)));

    let report = t.process_item(&item).await.unwrap();

    assert!(report.price_changed);
    assert!(report.persisted);
    assert!(report.history_recorded);
    assert_eq!(
      report.notification,
      NotificationOutcome::Dispatched {
        recipients:     1,
        tokens:         1,
        report:         pricewatch_core::provider::SendReport { success: 1, failure: 0 },
        reconciliation: Reconciliation::Matched(1),
      }
    );

    let stored = t.store().get_item(item.item_id).await.unwrap().unwrap();
    assert_eq!(stored.price, 80_000);
    assert_eq!(stored.price_history_lowest, 80_000);
    assert_eq!(stored.price_history_highest, 100_000);
    assert_eq!(stored.price_history_previous, 100_000);
    assert!(stored.price_last_changed_at > item.price_last_changed_at);

    let history = t
      .store()
      .history_range(item.item_id, item.created_at, Utc::now())
      .await
      .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!((history[0].price, history[0].stock), (80_000, 3));

    let sent = t.notifier().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].tokens, vec!["keen-phone".to_string()]);
    assert_eq!(sent[0].title, "Price drop: Kopi Arabika 250g");
    assert_eq!(sent[0].body, "Kopi Arabika 250g is now Rp 80.000");

    let keen = t.store().get_user(keen).await.unwrap().unwrap();
    assert_eq!(keen.tracked_item(item.item_id).unwrap().notification_count, 1);
    let picky = t.store().get_user(picky).await.unwrap().unwrap();
    assert_eq!(picky.tracked_item(item.item_id).unwrap().notification_count, 0);
  }

  #[tokio::test]
  async fn price_drop_out_of_stock_does_not_notify() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    subscribe(&t, &item, 90_000, &["phone"]).await;
    t.provider().push(&item.url, Ok(listing(80_000, 0)));

    let report = t.process_item(&item).await.unwrap();

    assert!(report.price_changed);
    assert_eq!(report.notification, NotificationOutcome::Skipped(SkipReason::OutOfStock));
    assert!(t.notifier().sent().is_empty());
    assert_eq!(report.item.price_history_lowest, 80_000);
  }

  #[tokio::test]
  async fn unchanged_fetch_still_samples_history() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    subscribe(&t, &item, 200_000, &["phone"]).await;
    t.provider().push(&item.url, Ok(listing(100_000, 5)));
    t.provider().push(&item.url, Ok(listing(100_000, 5)));

    let first = t.process_item(&item).await.unwrap();
    let second = t.process_item(&first.item).await.unwrap();

    for report in [&first, &second] {
      assert!(!report.price_changed);
      assert!(report.persisted);
      assert_eq!(
        report.notification,
        NotificationOutcome::Skipped(SkipReason::PriceUnchanged)
      );
    }
    assert!(second.item.updated_at > item.updated_at);
    assert!(t.notifier().sent().is_empty());

    let history = t
      .store()
      .history_range(item.item_id, item.created_at, Utc::now())
      .await
      .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].recorded_at >= history[1].recorded_at);
  }

  #[tokio::test]
  async fn notifier_failure_leaves_counters_alone() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    let user = subscribe(&t, &item, 90_000, &["phone"]).await;
    t.notifier().fail_next();
    t.provider().push(&item.url, Ok(listing(80_000, 3)));

    let report = t.process_item(&item).await.unwrap();

    assert_eq!(
      report.notification,
      NotificationOutcome::DispatchFailed { recipients: 1 }
    );
    let user = t.store().get_user(user).await.unwrap().unwrap();
    let tracked = user.tracked_item(item.item_id).unwrap();
    assert_eq!(tracked.notification_count, 0);
    assert_eq!(tracked.last_notified_at, None);
  }

  #[tokio::test]
  async fn sample_behind_a_newer_writer_is_still_recorded() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    subscribe(&t, &item, 90_000, &["phone"]).await;

    // Another writer's sample landed with a later stamp than this refresh.
    let ahead = Utc::now() + Duration::hours(1);
    t.store()
      .append_history(ItemHistory::sample(&item, ahead))
      .await
      .unwrap();
    t.provider().push(&item.url, Ok(listing(80_000, 3)));

    let report = t.process_item(&item).await.unwrap();

    assert!(report.history_recorded);
    assert!(matches!(report.notification, NotificationOutcome::Dispatched { .. }));
    let history = t
      .store()
      .history_range(item.item_id, item.created_at, ahead)
      .await
      .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.recorded_at == history[0].recorded_at));
    assert!(history.iter().any(|h| h.price == 80_000));
  }

  #[tokio::test]
  async fn history_append_failure_is_reported_not_raised() {
    let t = tracker(quick_config()).await;
    let unsaved = Item::from_external(&listing(80_000, 3), Utc::now());

    let recorded = t
      .record_history(ItemHistory::sample(&unsaved, unsaved.updated_at))
      .await;
    assert!(!recorded);
  }

  #[tokio::test]
  async fn fetch_errors_leave_the_item_untouched() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    t.provider()
      .push(&item.url, Err(ProviderError::NotFound("delisted".into())));

    let err = t.process_item(&item).await.unwrap_err();
    assert!(matches!(err, Error::Provider(ProviderError::NotFound(_))));

    let stored = t.store().get_item(item.item_id).await.unwrap().unwrap();
    assert_eq!(stored.updated_at, item.updated_at);
    let history = t
      .store()
      .history_range(item.item_id, item.created_at, Utc::now())
      .await
      .unwrap();
    assert!(history.is_empty());
  }

  #[tokio::test]
  async fn concurrent_write_is_re_merged_without_duplicate_notification() {
    let t = tracker(quick_config()).await;
    let stale = seed_item(&t, 100_000, 5).await;
    subscribe(&t, &stale, 90_000, &["phone"]).await;

    // Another writer records the same drop first.
    let mut winner = merge(&stale, &listing(80_000, 3), Utc::now()).item;
    winner.updated_at = stale.updated_at + Duration::seconds(1);
    let written = t.store().replace_item(&winner, stale.updated_at).await.unwrap();
    assert_eq!(written, ReplaceOutcome::Replaced);

    t.provider().push(&stale.url, Ok(listing(80_000, 2)));
    let report = t.process_item(&stale).await.unwrap();

    assert!(report.persisted);
    assert!(!report.price_changed);
    assert_eq!(report.notification, NotificationOutcome::Skipped(SkipReason::PriceUnchanged));
    assert!(t.notifier().sent().is_empty());

    let stored = t.store().get_item(stale.item_id).await.unwrap().unwrap();
    assert_eq!(stored.stock, 2);
    assert_eq!(stored.price, 80_000);
  }

  #[tokio::test]
  async fn users_without_tokens_are_not_counted() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    let silent = subscribe(&t, &item, 90_000, &[]).await;
    t.provider().push(&item.url, Ok(listing(80_000, 3)));

    let report = t.process_item(&item).await.unwrap();

    assert_eq!(report.notification, NotificationOutcome::Skipped(SkipReason::NoRecipients));
    let silent = t.store().get_user(silent).await.unwrap().unwrap();
    assert_eq!(silent.tracked_item(item.item_id).unwrap().notification_count, 0);
  }

  #[tokio::test]
  async fn notification_cap_is_applied() {
    let t = tracker(TrackerConfig {
      notification_cap: Some(1),
      ..quick_config()
    })
    .await;
    let item = seed_item(&t, 100_000, 5).await;
    subscribe(&t, &item, 90_000, &["phone"]).await;
    t.provider().push(&item.url, Ok(listing(80_000, 3)));
    t.provider().push(&item.url, Ok(listing(75_000, 3)));

    let first = t.process_item(&item).await.unwrap();
    assert!(matches!(first.notification, NotificationOutcome::Dispatched { .. }));

    let second = t.process_item(&first.item).await.unwrap();
    assert!(second.price_changed);
    assert_eq!(second.notification, NotificationOutcome::Skipped(SkipReason::NoRecipients));
    assert_eq!(t.notifier().sent().len(), 1);
  }

  #[tokio::test]
  async fn replayed_dispatch_is_reported_as_mismatch() {
    let t = tracker(quick_config()).await;
    let item = seed_item(&t, 100_000, 5).await;
    subscribe(&t, &item, 90_000, &["phone"]).await;
    t.provider().push(&item.url, Ok(listing(80_000, 3)));

    let report = t.process_item(&item).await.unwrap();
    let again = t.notify_price_drop(&report.item).await;

    match again {
      NotificationOutcome::Dispatched { reconciliation, .. } => assert_eq!(
        reconciliation,
        Reconciliation::Mismatch { submitted: 1, modified: 0 }
      ),
      other => panic!("expected a dispatch, got {other:?}"),
    }
    let counts = t.store().find_users_tracking_item(item.item_id).await.unwrap();
    assert_eq!(counts[0].tracked_item.notification_count, 1);
  }
}
