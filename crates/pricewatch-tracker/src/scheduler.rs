//! Background refresh: one long-lived loop per supported site.
//!
//! Loops run in parallel across sites, each on its own interval and start
//! offset. Within a site, items are refreshed one at a time with a fixed
//! delay plus random jitter in between. A shutdown signal stops new fetches
//! promptly; an item already in flight is allowed to finish.

use std::time::Duration;

use pricewatch_core::{
  provider::{Notifier, Provider, ProviderError},
  site::Site,
  store::ItemStore,
};
use rand::{Rng, thread_rng};
use tokio::{
  sync::broadcast::{self, error::TryRecvError},
  task::JoinSet,
  time::MissedTickBehavior,
};
use tracing::{debug, error, info, warn};

use crate::{Error, Tracker, TrackerStore, fanout::NotificationOutcome};

/// Counts for one pass over a site's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
  pub items:        usize,
  pub refreshed:    usize,
  /// Fetched, but the item write or the history append failed.
  pub store_failed: usize,
  pub not_found:    usize,
  pub failed:       usize,
  /// Items whose refresh sent a notification batch.
  pub notified:     usize,
  /// The pass stopped early on shutdown.
  pub interrupted:  bool,
}

fn shutdown_requested(rx: &mut broadcast::Receiver<()>) -> bool {
  !matches!(rx.try_recv(), Err(TryRecvError::Empty))
}

impl<S, P, N> Tracker<S, P, N>
where
  S: TrackerStore + 'static,
  P: Provider + 'static,
  N: Notifier + 'static,
{
  /// Spawn a loop for every site the provider supports. Returns those sites.
  pub fn spawn_site_loops(
    &self,
    tasks:    &mut JoinSet<()>,
    shutdown: &broadcast::Sender<()>,
  ) -> Vec<Site> {
    let sites: Vec<Site> = Site::all().filter(|s| self.provider.supports(*s)).collect();
    for &site in &sites {
      let tracker = self.clone();
      let mut rx = shutdown.subscribe();
      tasks.spawn(async move { tracker.run_site_loop(site, &mut rx).await });
    }
    sites
  }
}

impl<S, P, N> Tracker<S, P, N>
where
  S: TrackerStore,
  P: Provider,
  N: Notifier,
{
  /// Wait for the site's start offset, then refresh it every interval until
  /// shutdown.
  pub async fn run_site_loop(&self, site: Site, rx: &mut broadcast::Receiver<()>) {
    let offset = self.config.site_offset(site);
    tokio::select! {
      _ = tokio::time::sleep(offset) => {}
      _ = rx.recv() => {
        info!(%site, "site loop: shutdown before start");
        return;
      }
    }

    let mut ticker = tokio::time::interval(self.config.fetch_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(%site, interval_secs = self.config.fetch_interval_secs, "site loop: started");

    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        _ = rx.recv() => {
          info!(%site, "site loop: shutdown");
          break;
        }
      }

      let summary = self.run_site_tick(site, rx).await;
      info!(
        %site,
        items = summary.items,
        refreshed = summary.refreshed,
        store_failed = summary.store_failed,
        not_found = summary.not_found,
        failed = summary.failed,
        notified = summary.notified,
        "site loop: tick complete"
      );
      if summary.interrupted {
        info!(%site, "site loop: shutdown mid-tick");
        break;
      }
    }
  }

  /// Refresh every known item of `site` once, serially. Per-item failures
  /// are logged and counted, never propagated.
  pub async fn run_site_tick(&self, site: Site, rx: &mut broadcast::Receiver<()>) -> TickSummary {
    let items = match self.store.list_items_by_site(site).await {
      Ok(items) => items,
      Err(e) => {
        error!(%site, error = %e, "failed to list items");
        return TickSummary::default();
      }
    };

    let mut summary = TickSummary {
      items: items.len(),
      ..TickSummary::default()
    };

    for (idx, item) in items.iter().enumerate() {
      if shutdown_requested(rx) {
        summary.interrupted = true;
        break;
      }
      if idx > 0 {
        let pause = self.item_pause();
        tokio::select! {
          _ = tokio::time::sleep(pause) => {}
          _ = rx.recv() => {
            summary.interrupted = true;
            break;
          }
        }
      }

      match self.process_item(item).await {
        Ok(report) => {
          if report.persisted && report.history_recorded {
            summary.refreshed += 1;
          } else {
            summary.store_failed += 1;
          }
          if matches!(report.notification, NotificationOutcome::Dispatched { .. }) {
            summary.notified += 1;
          }
        }
        Err(Error::Provider(ProviderError::NotFound(reason))) => {
          debug!(%site, item_id = %item.item_id, %reason, "item not found upstream");
          summary.not_found += 1;
        }
        Err(Error::Provider(ProviderError::Transient(reason))) => {
          warn!(%site, item_id = %item.item_id, %reason, "fetch failed, retrying next tick");
          summary.failed += 1;
        }
        Err(e) => {
          error!(%site, item_id = %item.item_id, error = %e, "item refresh failed");
          summary.failed += 1;
        }
      }
    }

    summary
  }

  /// Base delay plus uniform jitter.
  fn item_pause(&self) -> Duration {
    let jitter = match self.config.max_jitter_ms {
      0 => 0,
      max => thread_rng().gen_range(0..=max),
    };
    self.config.item_delay() + Duration::from_millis(jitter)
  }
}

#[cfg(test)]
mod tests {
  use pricewatch_core::store::HistoryStore;

  use super::*;
  use crate::testing::{listing_for, quick_config, seed, tracker};

  #[tokio::test]
  async fn tick_processes_every_item_despite_failures() {
    let t = tracker(quick_config()).await;
    let ok = seed(&t, listing_for("1", 10_000, 1)).await;
    let gone = seed(&t, listing_for("2", 20_000, 1)).await;
    let flaky = seed(&t, listing_for("3", 30_000, 1)).await;
    t.provider().push(&ok.url, Ok(listing_for("1", 9_000, 1)));
    t.provider()
      .push(&gone.url, Err(ProviderError::NotFound("delisted".into())));
    t.provider()
      .push(&flaky.url, Err(ProviderError::Transient("timeout".into())));

    let (_tx, mut rx) = broadcast::channel(1);
    let summary = t.run_site_tick(Site::Shopee, &mut rx).await;

    assert_eq!(
      summary,
      TickSummary {
        items:        3,
        refreshed:    1,
        store_failed: 0,
        not_found:    1,
        failed:       1,
        notified:     0,
        interrupted:  false,
      }
    );
    let history = t
      .store()
      .history_range(ok.item_id, ok.created_at, chrono::Utc::now())
      .await
      .unwrap();
    assert_eq!(history.len(), 1);
  }

  #[tokio::test]
  async fn rejected_writes_are_not_counted_as_refreshed() {
    let t = tracker(quick_config()).await;
    let item = seed(&t, listing_for("1", 10_000, 1)).await;
    // SQLite stores NaN as NULL, which the NOT NULL rating columns refuse.
    let mut unstorable = listing_for("1", 9_000, 1);
    unstorable.rating = f64::NAN;
    t.provider().push(&item.url, Ok(unstorable));

    let (_tx, mut rx) = broadcast::channel(1);
    let summary = t.run_site_tick(Site::Shopee, &mut rx).await;

    assert_eq!(summary.items, 1);
    assert_eq!(summary.refreshed, 0);
    assert_eq!(summary.store_failed, 1);
    assert_eq!(summary.failed, 0);

    let stored = t.store().get_item(item.item_id).await.unwrap().unwrap();
    assert_eq!(stored.price, 10_000);
  }

  #[tokio::test]
  async fn tick_only_covers_its_site() {
    let t = tracker(quick_config()).await;
    let mut other = listing_for("1", 10_000, 1);
    other.site = Site::Blibli;
    seed(&t, other).await;

    let (_tx, mut rx) = broadcast::channel(1);
    let summary = t.run_site_tick(Site::Shopee, &mut rx).await;
    assert_eq!(summary.items, 0);
  }

  #[tokio::test]
  async fn pending_shutdown_stops_before_fetching() {
    let t = tracker(quick_config()).await;
    seed(&t, listing_for("1", 10_000, 1)).await;
    seed(&t, listing_for("2", 10_000, 1)).await;

    let (tx, mut rx) = broadcast::channel(1);
    tx.send(()).unwrap();
    let summary = t.run_site_tick(Site::Shopee, &mut rx).await;

    assert!(summary.interrupted);
    assert_eq!(summary.items, 2);
    assert_eq!(summary.refreshed + summary.store_failed + summary.failed + summary.not_found, 0);
  }

  #[tokio::test]
  async fn loops_spawn_for_supported_sites_and_stop_on_shutdown() {
    let t = tracker(quick_config()).await;
    let (tx, _) = broadcast::channel(5);
    let mut tasks = JoinSet::new();

    let sites = t.spawn_site_loops(&mut tasks, &tx);
    assert_eq!(sites, vec![Site::Shopee]);

    tx.send(()).unwrap();
    let joined = tokio::time::timeout(Duration::from_secs(5), async {
      while let Some(res) = tasks.join_next().await {
        res.unwrap();
      }
    })
    .await;
    assert!(joined.is_ok());
  }

  #[tokio::test]
  async fn pause_stays_within_jitter_bounds() {
    let t = tracker(crate::TrackerConfig {
      item_delay_ms: 100,
      max_jitter_ms: 50,
      ..crate::TrackerConfig::default()
    })
    .await;
    for _ in 0..50 {
      let pause = t.item_pause();
      assert!(pause >= Duration::from_millis(100));
      assert!(pause <= Duration::from_millis(150));
    }
  }
}
