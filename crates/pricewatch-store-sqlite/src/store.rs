//! [`SqliteStore`] — the SQLite implementation of [`ItemStore`] and
//! [`HistoryStore`]. Subscriptions live in [`crate::subscriptions`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use pricewatch_core::{
  history::ItemHistory,
  item::{Identity, Item},
  site::Site,
  store::{HistoryStore, InsertOutcome, ItemStore, ReplaceOutcome},
};

use crate::{
  encode::{
    encode_dt, encode_site, encode_uuid, RawHistory, RawItem, ITEM_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A pricewatch store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Owned column values for an `items` write, in [`ITEM_COLUMNS`] order.
struct EncodedItem {
  item_id:                String,
  site:                   &'static str,
  merchant_id:            String,
  product_id:             String,
  url:                    String,
  name:                   String,
  price:                  i64,
  stock:                  i64,
  image_url:              String,
  description:            String,
  rating:                 f64,
  sold_count:             i64,
  price_history_previous: i64,
  price_history_highest:  i64,
  price_history_lowest:   i64,
  price_last_changed_at:  String,
  created_at:             String,
  updated_at:             String,
}

impl EncodedItem {
  fn new(item: &Item) -> Self {
    Self {
      item_id:                encode_uuid(item.item_id),
      site:                   encode_site(item.site),
      merchant_id:            item.merchant_id.clone(),
      product_id:             item.product_id.clone(),
      url:                    item.url.clone(),
      name:                   item.name.clone(),
      price:                  item.price,
      stock:                  item.stock,
      image_url:              item.image_url.clone(),
      description:            item.description.clone(),
      rating:                 item.rating,
      sold_count:             item.sold_count,
      price_history_previous: item.price_history_previous,
      price_history_highest:  item.price_history_highest,
      price_history_lowest:   item.price_history_lowest,
      price_last_changed_at:  encode_dt(item.price_last_changed_at),
      created_at:             encode_dt(item.created_at),
      updated_at:             encode_dt(item.updated_at),
    }
  }
}

// ─── ItemStore impl ──────────────────────────────────────────────────────────

impl ItemStore for SqliteStore {
  type Error = Error;

  async fn find_by_identity(&self, identity: &Identity) -> Result<Option<Item>> {
    let site        = encode_site(identity.site);
    let merchant_id = identity.merchant_id.clone();
    let product_id  = identity.product_id.clone();

    let raw: Option<RawItem> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {ITEM_COLUMNS} FROM items
               WHERE site = ?1 AND merchant_id = ?2 AND product_id = ?3"
            ),
            rusqlite::params![site, merchant_id, product_id],
            RawItem::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawItem::into_item).transpose()
  }

  async fn get_item(&self, item_id: Uuid) -> Result<Option<Item>> {
    let id_str = encode_uuid(item_id);

    let raw: Option<RawItem> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE item_id = ?1"),
            rusqlite::params![id_str],
            RawItem::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawItem::into_item).transpose()
  }

  async fn insert_item(&self, item: Item) -> Result<InsertOutcome> {
    let e = EncodedItem::new(&item);

    // The identity UNIQUE constraint is the conflict signal: a losing
    // concurrent insert reads back the winner's row instead of failing.
    let existing: Option<Option<RawItem>> = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          &format!(
            "INSERT INTO items ({ITEM_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                     ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT (site, merchant_id, product_id) DO NOTHING"
          ),
          rusqlite::params![
            e.item_id,
            e.site,
            e.merchant_id,
            e.product_id,
            e.url,
            e.name,
            e.price,
            e.stock,
            e.image_url,
            e.description,
            e.rating,
            e.sold_count,
            e.price_history_previous,
            e.price_history_highest,
            e.price_history_lowest,
            e.price_last_changed_at,
            e.created_at,
            e.updated_at,
          ],
        )?;
        if inserted == 1 {
          return Ok(None);
        }

        let raw = conn
          .query_row(
            &format!(
              "SELECT {ITEM_COLUMNS} FROM items
               WHERE site = ?1 AND merchant_id = ?2 AND product_id = ?3"
            ),
            rusqlite::params![e.site, e.merchant_id, e.product_id],
            RawItem::from_row,
          )
          .optional()?;
        Ok(Some(raw))
      })
      .await?;

    match existing {
      None => Ok(InsertOutcome::Inserted(item)),
      Some(Some(raw)) => Ok(InsertOutcome::Existing(raw.into_item()?)),
      Some(None) => Err(Error::Inconsistent(format!(
        "insert of {:?} conflicted but no row holds that identity",
        item.identity()
      ))),
    }
  }

  async fn replace_item(
    &self,
    item:                &Item,
    expected_updated_at: DateTime<Utc>,
  ) -> Result<ReplaceOutcome> {
    let e        = EncodedItem::new(item);
    let expected = encode_dt(expected_updated_at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE items SET
             url = ?2, name = ?3, price = ?4, stock = ?5, image_url = ?6,
             description = ?7, rating = ?8, sold_count = ?9,
             price_history_previous = ?10, price_history_highest = ?11,
             price_history_lowest = ?12, price_last_changed_at = ?13,
             updated_at = ?14
           WHERE item_id = ?1 AND updated_at = ?15",
          rusqlite::params![
            e.item_id,
            e.url,
            e.name,
            e.price,
            e.stock,
            e.image_url,
            e.description,
            e.rating,
            e.sold_count,
            e.price_history_previous,
            e.price_history_highest,
            e.price_history_lowest,
            e.price_last_changed_at,
            e.updated_at,
            expected,
          ],
        )?)
      })
      .await?;

    Ok(if changed == 1 {
      ReplaceOutcome::Replaced
    } else {
      ReplaceOutcome::NotModified
    })
  }

  async fn list_items_by_site(&self, site: Site) -> Result<Vec<Item>> {
    let site_str = encode_site(site);

    let raws: Vec<RawItem> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ITEM_COLUMNS} FROM items WHERE site = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![site_str], RawItem::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawItem::into_item).collect()
  }
}

// ─── HistoryStore impl ───────────────────────────────────────────────────────

impl HistoryStore for SqliteStore {
  type Error = Error;

  async fn append_history(&self, entry: ItemHistory) -> Result<()> {
    let history_id = encode_uuid(entry.history_id);
    let item_id    = encode_uuid(entry.item_id);
    let at_str     = encode_dt(entry.recorded_at);

    let inserted = self
      .conn
      .call(move |conn| {
        // Single statement: the stamp is raised to the newest existing one
        // for the item, so concurrent writers never lose a sample.
        Ok(conn.execute(
          "INSERT INTO item_history
             (history_id, item_id, price, stock, rating, sold_count, recorded_at)
           SELECT ?1, ?2, ?3, ?4, ?5, ?6, max(?7, coalesce(
             (SELECT max(recorded_at) FROM item_history WHERE item_id = ?2), ?7
           ))
           WHERE true
           ON CONFLICT (history_id) DO NOTHING",
          rusqlite::params![
            history_id,
            item_id,
            entry.price,
            entry.stock,
            entry.rating,
            entry.sold_count,
            at_str,
          ],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::DuplicateHistory {
        history_id: entry.history_id,
      });
    }
    Ok(())
  }

  async fn history_range(
    &self,
    item_id: Uuid,
    start:   DateTime<Utc>,
    end:     DateTime<Utc>,
  ) -> Result<Vec<ItemHistory>> {
    let id_str    = encode_uuid(item_id);
    let start_str = encode_dt(start);
    let end_str   = encode_dt(end);

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT history_id, item_id, price, stock, rating, sold_count, recorded_at
           FROM item_history
           WHERE item_id = ?1 AND recorded_at >= ?2 AND recorded_at <= ?3
           ORDER BY recorded_at DESC, rowid DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, start_str, end_str], |row| {
            Ok(RawHistory {
              history_id:  row.get(0)?,
              item_id:     row.get(1)?,
              price:       row.get(2)?,
              stock:       row.get(3)?,
              rating:      row.get(4)?,
              sold_count:  row.get(5)?,
              recorded_at: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_history).collect()
  }
}
