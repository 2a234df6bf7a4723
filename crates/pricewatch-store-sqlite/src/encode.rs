//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so they compare correctly as text. UUIDs are stored
//! as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use pricewatch_core::{
  history::ItemHistory,
  item::Item,
  site::Site,
  user::{Device, TrackedItem},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Site ─────────────────────────────────────────────────────────────────────

pub fn encode_site(site: Site) -> &'static str {
  match site {
    Site::Shopee => "shopee",
    Site::Tokopedia => "tokopedia",
    Site::Blibli => "blibli",
  }
}

pub fn decode_site(s: &str) -> Result<Site> {
  Ok(Site::from_discriminant(s)?)
}

// ─── Counters ─────────────────────────────────────────────────────────────────

fn decode_count(column: &str, value: i64) -> Result<u32> {
  u32::try_from(value)
    .map_err(|_| Error::OutOfRange(format!("{column} = {value}")))
}

// ─── Row types ────────────────────────────────────────────────────────────────

/// Column list matching [`RawItem::from_row`].
pub const ITEM_COLUMNS: &str = "item_id, site, merchant_id, product_id, url, \
   name, price, stock, image_url, description, rating, sold_count, \
   price_history_previous, price_history_highest, price_history_lowest, \
   price_last_changed_at, created_at, updated_at";

/// Raw values read directly from an `items` row.
pub struct RawItem {
  pub item_id:                String,
  pub site:                   String,
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
  pub price_history_previous: i64,
  pub price_history_highest:  i64,
  pub price_history_lowest:   i64,
  pub price_last_changed_at:  String,
  pub created_at:             String,
  pub updated_at:             String,
}

impl RawItem {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      item_id:                row.get(0)?,
      site:                   row.get(1)?,
      merchant_id:            row.get(2)?,
      product_id:             row.get(3)?,
      url:                    row.get(4)?,
      name:                   row.get(5)?,
      price:                  row.get(6)?,
      stock:                  row.get(7)?,
      image_url:              row.get(8)?,
      description:            row.get(9)?,
      rating:                 row.get(10)?,
      sold_count:             row.get(11)?,
      price_history_previous: row.get(12)?,
      price_history_highest:  row.get(13)?,
      price_history_lowest:   row.get(14)?,
      price_last_changed_at:  row.get(15)?,
      created_at:             row.get(16)?,
      updated_at:             row.get(17)?,
    })
  }

  pub fn into_item(self) -> Result<Item> {
    Ok(Item {
      item_id:                decode_uuid(&self.item_id)?,
      site:                   decode_site(&self.site)?,
      merchant_id:            self.merchant_id,
      product_id:             self.product_id,
      url:                    self.url,
      name:                   self.name,
      price:                  self.price,
      stock:                  self.stock,
      image_url:              self.image_url,
      description:            self.description,
      rating:                 self.rating,
      sold_count:             self.sold_count,
      price_history_previous: self.price_history_previous,
      price_history_highest:  self.price_history_highest,
      price_history_lowest:   self.price_history_lowest,
      price_last_changed_at:  decode_dt(&self.price_last_changed_at)?,
      created_at:             decode_dt(&self.created_at)?,
      updated_at:             decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from an `item_history` row.
pub struct RawHistory {
  pub history_id:  String,
  pub item_id:     String,
  pub price:       i64,
  pub stock:       i64,
  pub rating:      f64,
  pub sold_count:  i64,
  pub recorded_at: String,
}

impl RawHistory {
  pub fn into_history(self) -> Result<ItemHistory> {
    Ok(ItemHistory {
      history_id:  decode_uuid(&self.history_id)?,
      item_id:     decode_uuid(&self.item_id)?,
      price:       self.price,
      stock:       self.stock,
      rating:      self.rating,
      sold_count:  self.sold_count,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw values read directly from a `devices` row.
pub struct RawDevice {
  pub device_id:  String,
  pub push_token: Option<String>,
  pub last_seen:  String,
  pub created_at: String,
}

impl RawDevice {
  pub fn into_device(self) -> Result<Device> {
    Ok(Device {
      device_id:  self.device_id,
      push_token: self.push_token,
      last_seen:  decode_dt(&self.last_seen)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawTrackedItem::from_row`], qualified by `t.`.
pub const TRACKED_ITEM_COLUMNS: &str = "t.item_id, t.price_lower_threshold, \
   t.notification_enabled, t.notification_count, t.notification_count_total, \
   t.last_notified_at, t.created_at, t.updated_at";

/// Raw values read directly from a `tracked_items` row.
pub struct RawTrackedItem {
  pub item_id:                  String,
  pub price_lower_threshold:    i64,
  pub notification_enabled:     bool,
  pub notification_count:       i64,
  pub notification_count_total: i64,
  pub last_notified_at:         Option<String>,
  pub created_at:               String,
  pub updated_at:               String,
}

impl RawTrackedItem {
  /// Read the [`TRACKED_ITEM_COLUMNS`] starting at column `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      item_id:                  row.get(offset)?,
      price_lower_threshold:    row.get(offset + 1)?,
      notification_enabled:     row.get(offset + 2)?,
      notification_count:       row.get(offset + 3)?,
      notification_count_total: row.get(offset + 4)?,
      last_notified_at:         row.get(offset + 5)?,
      created_at:               row.get(offset + 6)?,
      updated_at:               row.get(offset + 7)?,
    })
  }

  pub fn into_tracked_item(self) -> Result<TrackedItem> {
    Ok(TrackedItem {
      item_id:                  decode_uuid(&self.item_id)?,
      price_lower_threshold:    self.price_lower_threshold,
      notification_enabled:     self.notification_enabled,
      notification_count:       decode_count(
        "notification_count",
        self.notification_count,
      )?,
      notification_count_total: decode_count(
        "notification_count_total",
        self.notification_count_total,
      )?,
      last_notified_at:         self
        .last_notified_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      created_at:               decode_dt(&self.created_at)?,
      updated_at:               decode_dt(&self.updated_at)?,
    })
  }
}
