//! In-process fakes and fixtures for tracker tests.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::{Duration, Utc};
use pricewatch_core::{
  item::{ExternalItem, Item},
  provider::{Notifier, NotifierError, Provider, ProviderError, PushMessage, SendReport},
  site::Site,
  store::{ItemStore, SubscriptionStore},
  user::NewTrackedItem,
};
use pricewatch_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{Tracker, TrackerConfig};

// ─── Provider ────────────────────────────────────────────────────────────────

/// Replays scripted fetch results per URL. Only Shopee is supported.
#[derive(Default)]
pub struct FakeProvider {
  scripted: Mutex<HashMap<String, VecDeque<Result<ExternalItem, ProviderError>>>>,
}

impl FakeProvider {
  pub fn push(&self, url: &str, result: Result<ExternalItem, ProviderError>) {
    self
      .scripted
      .lock()
      .unwrap()
      .entry(url.to_owned())
      .or_default()
      .push_back(result);
  }
}

impl Provider for FakeProvider {
  fn supports(&self, site: Site) -> bool { site == Site::Shopee }

  async fn fetch_item(&self, url: &str) -> Result<ExternalItem, ProviderError> {
    let next = self
      .scripted
      .lock()
      .unwrap()
      .get_mut(url)
      .and_then(VecDeque::pop_front);
    next.unwrap_or_else(|| Err(ProviderError::Transient(format!("nothing scripted for {url}"))))
  }
}

// ─── Notifier ────────────────────────────────────────────────────────────────

/// Records every message; every token counts as delivered.
#[derive(Default)]
pub struct RecordingNotifier {
  sent:      Mutex<Vec<PushMessage>>,
  fail_next: AtomicBool,
}

impl RecordingNotifier {
  pub fn sent(&self) -> Vec<PushMessage> { self.sent.lock().unwrap().clone() }

  pub fn fail_next(&self) { self.fail_next.store(true, Ordering::SeqCst); }
}

impl Notifier for RecordingNotifier {
  async fn send(&self, message: &PushMessage) -> Result<SendReport, NotifierError> {
    if self.fail_next.swap(false, Ordering::SeqCst) {
      return Err(NotifierError::Request("connection refused".into()));
    }
    self.sent.lock().unwrap().push(message.clone());
    Ok(SendReport {
      success: message.tokens.len() as u32,
      failure: 0,
    })
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub type TestTracker = Tracker<SqliteStore, FakeProvider, RecordingNotifier>;

pub async fn tracker(config: TrackerConfig) -> TestTracker {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  Tracker::new(store, FakeProvider::default(), RecordingNotifier::default(), config)
    .expect("valid config")
}

/// Defaults without inter-item pauses.
pub fn quick_config() -> TrackerConfig {
  TrackerConfig {
    item_delay_ms: 0,
    max_jitter_ms: 0,
    ..TrackerConfig::default()
  }
}

/// The listing at `https://shopee.co.id/product/1/42`.
pub fn listing(price: i64, stock: i64) -> ExternalItem {
  listing_for("42", price, stock)
}

pub fn listing_for(product_id: &str, price: i64, stock: i64) -> ExternalItem {
  ExternalItem {
    site: Site::Shopee,
    merchant_id: "1".into(),
    product_id: product_id.into(),
    url: format!("https://shopee.co.id/product/1/{product_id}"),
    name: "Kopi Arabika 250g".into(),
    price,
    stock,
    image_url: "https://cf.shopee.co.id/file/kopi".into(),
    description: "Medium roast".into(),
    rating: 4.7,
    sold_count: 310,
  }
}

/// Store the [`listing`] item as first seen an hour ago.
pub async fn seed_item(t: &TestTracker, price: i64, stock: i64) -> Item {
  seed(t, listing(price, stock)).await
}

pub async fn seed(t: &TestTracker, fetched: ExternalItem) -> Item {
  let item = Item::from_external(&fetched, Utc::now() - Duration::hours(1));
  t.store().insert_item(item).await.unwrap().into_item()
}

/// Create a user with one device per token, subscribed to `item`.
pub async fn subscribe(t: &TestTracker, item: &Item, threshold: i64, tokens: &[&str]) -> Uuid {
  let store = t.store();
  let user = store
    .add_user("Subscriber".into(), format!("{}@example.com", Uuid::new_v4()))
    .await
    .unwrap();
  for (n, token) in tokens.iter().enumerate() {
    store
      .add_device(user.user_id, format!("device-{n}"), Some(token.to_string()))
      .await
      .unwrap();
  }
  store
    .upsert_tracked_item(
      user.user_id,
      NewTrackedItem {
        item_id:               item.item_id,
        price_lower_threshold: threshold,
        notification_enabled:  true,
      },
    )
    .await
    .unwrap();
  user.user_id
}
