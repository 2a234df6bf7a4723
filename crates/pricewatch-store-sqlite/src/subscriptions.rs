//! [`SubscriptionStore`] for [`SqliteStore`]: users, devices, tracked items
//! and the notification-counter ledger.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use pricewatch_core::{
  store::{SubscriptionStore, UpsertOutcome},
  item::stored_precision,
  user::{NewTrackedItem, Subscriber, User, MAX_DEVICES, MAX_TRACKED_ITEMS},
};

use crate::{
  encode::{
    decode_dt, decode_uuid, encode_dt, encode_uuid, RawDevice, RawTrackedItem,
    TRACKED_ITEM_COLUMNS,
  },
  Error, Result, SqliteStore,
};

/// Raw values from a `users` row plus its child rows.
struct RawUser {
  user_id:       String,
  name:          String,
  email:         String,
  created_at:    String,
  updated_at:    String,
  devices:       Vec<RawDevice>,
  tracked_items: Vec<RawTrackedItem>,
}

impl RawUser {
  fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:       decode_uuid(&self.user_id)?,
      name:          self.name,
      email:         self.email,
      devices:       self
        .devices
        .into_iter()
        .map(RawDevice::into_device)
        .collect::<Result<_>>()?,
      tracked_items: self
        .tracked_items
        .into_iter()
        .map(RawTrackedItem::into_tracked_item)
        .collect::<Result<_>>()?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

fn user_exists(conn: &rusqlite::Connection, user_id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM users WHERE user_id = ?1",
        rusqlite::params![user_id],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

/// A push token belongs to at most one device; steal it from any other.
fn release_push_token(
  conn:      &rusqlite::Connection,
  token:     &str,
  user_id:   &str,
  device_id: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE devices SET push_token = NULL
     WHERE push_token = ?1 AND NOT (user_id = ?2 AND device_id = ?3)",
    rusqlite::params![token, user_id, device_id],
  )?;
  Ok(())
}

/// Ledger rows older than this are pruned on each increment. A dispatch
/// replayed after the window is credited again.
pub(crate) const DISPATCH_RETENTION_DAYS: i64 = 30;

// ─── SubscriptionStore impl ──────────────────────────────────────────────────

impl SubscriptionStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn add_user(&self, name: String, email: String) -> Result<User> {
    let now  = stored_precision(Utc::now());
    let user = User {
      user_id: Uuid::new_v4(),
      name,
      email,
      devices: Vec::new(),
      tracked_items: Vec::new(),
      created_at: now,
      updated_at: now,
    };

    let id_str = encode_uuid(user.user_id);
    let name   = user.name.clone();
    let email  = user.email.clone();
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, name, email, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![id_str, name, email, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(user)
  }

  async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        let head = conn
          .query_row(
            "SELECT name, email, created_at, updated_at FROM users WHERE user_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
              ))
            },
          )
          .optional()?;
        let Some((name, email, created_at, updated_at)) = head else {
          return Ok(None);
        };

        let mut stmt = conn.prepare(
          "SELECT device_id, push_token, last_seen, created_at FROM devices
           WHERE user_id = ?1 ORDER BY last_seen DESC, rowid DESC",
        )?;
        let devices = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawDevice {
              device_id:  row.get(0)?,
              push_token: row.get(1)?,
              last_seen:  row.get(2)?,
              created_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {TRACKED_ITEM_COLUMNS} FROM tracked_items t
           WHERE t.user_id = ?1 ORDER BY t.updated_at DESC"
        ))?;
        let tracked_items = stmt
          .query_map(rusqlite::params![id_str], |row| {
            RawTrackedItem::from_row(row, 0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(RawUser {
          user_id: id_str,
          name,
          email,
          created_at,
          updated_at,
          devices,
          tracked_items,
        }))
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  // ── Devices ───────────────────────────────────────────────────────────────

  async fn add_device(
    &self,
    user_id:    Uuid,
    device_id:  String,
    push_token: Option<String>,
  ) -> Result<bool> {
    let id_str = encode_uuid(user_id);
    let at_str = encode_dt(Utc::now());

    let added = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !user_exists(&tx, &id_str)? {
          return Ok(false);
        }

        if let Some(token) = push_token.as_deref() {
          release_push_token(&tx, token, &id_str, &device_id)?;
        }

        // Re-registering keeps the stored token unless a new one is given.
        tx.execute(
          "INSERT INTO devices (user_id, device_id, push_token, last_seen, created_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (user_id, device_id) DO UPDATE SET
             push_token = COALESCE(excluded.push_token, devices.push_token),
             last_seen  = excluded.last_seen",
          rusqlite::params![id_str, device_id, push_token, at_str],
        )?;

        tx.execute(
          "DELETE FROM devices WHERE user_id = ?1 AND rowid NOT IN (
             SELECT rowid FROM devices WHERE user_id = ?1
             ORDER BY last_seen DESC, rowid DESC LIMIT ?2
           )",
          rusqlite::params![id_str, MAX_DEVICES as i64],
        )?;

        tx.execute(
          "UPDATE users SET updated_at = ?2 WHERE user_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(added)
  }

  async fn set_push_token(
    &self,
    user_id:    Uuid,
    device_id:  String,
    push_token: Option<String>,
  ) -> Result<bool> {
    let id_str = encode_uuid(user_id);

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(token) = push_token.as_deref() {
          release_push_token(&tx, token, &id_str, &device_id)?;
        }
        let changed = tx.execute(
          "UPDATE devices SET push_token = ?3 WHERE user_id = ?1 AND device_id = ?2",
          rusqlite::params![id_str, device_id, push_token],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(updated)
  }

  async fn remove_device(&self, user_id: Uuid, device_id: String) -> Result<bool> {
    let id_str = encode_uuid(user_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM devices WHERE user_id = ?1 AND device_id = ?2",
          rusqlite::params![id_str, device_id],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn upsert_tracked_item(
    &self,
    user_id: Uuid,
    input:   NewTrackedItem,
  ) -> Result<UpsertOutcome> {
    let id_str      = encode_uuid(user_id);
    let item_id_str = encode_uuid(input.item_id);
    let at_str      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !user_exists(&tx, &id_str)? {
          return Ok(UpsertOutcome::UserNotFound);
        }

        let updated = tx.execute(
          "UPDATE tracked_items SET
             price_lower_threshold = ?3,
             notification_enabled  = ?4,
             notification_count    = 0,
             updated_at            = ?5
           WHERE user_id = ?1 AND item_id = ?2",
          rusqlite::params![
            id_str,
            item_id_str,
            input.price_lower_threshold,
            input.notification_enabled,
            at_str,
          ],
        )?;

        let outcome = if updated == 1 {
          UpsertOutcome::Updated
        } else {
          let tracked: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tracked_items WHERE user_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )?;
          if tracked >= MAX_TRACKED_ITEMS as i64 {
            return Ok(UpsertOutcome::LimitReached);
          }

          tx.execute(
            "INSERT INTO tracked_items
               (user_id, item_id, price_lower_threshold, notification_enabled,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
              id_str,
              item_id_str,
              input.price_lower_threshold,
              input.notification_enabled,
              at_str,
            ],
          )?;
          UpsertOutcome::Created
        };

        tx.execute(
          "UPDATE users SET updated_at = ?2 WHERE user_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    Ok(outcome)
  }

  async fn remove_tracked_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
    let id_str      = encode_uuid(user_id);
    let item_id_str = encode_uuid(item_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM tracked_items WHERE user_id = ?1 AND item_id = ?2",
          rusqlite::params![id_str, item_id_str],
        )?)
      })
      .await?;

    Ok(removed > 0)
  }

  async fn find_users_tracking_item(&self, item_id: Uuid) -> Result<Vec<Subscriber>> {
    let item_id_str = encode_uuid(item_id);

    let (rows, mut tokens) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT t.user_id, {TRACKED_ITEM_COLUMNS} FROM tracked_items t
           WHERE t.item_id = ?1 ORDER BY t.created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![item_id_str], |row| {
            Ok((row.get::<_, String>(0)?, RawTrackedItem::from_row(row, 1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT d.user_id, d.push_token FROM devices d
           JOIN tracked_items t ON t.user_id = d.user_id
           WHERE t.item_id = ?1 AND d.push_token IS NOT NULL AND d.push_token <> ''
           ORDER BY d.last_seen DESC, d.rowid DESC",
        )?;
        let mut tokens: HashMap<String, Vec<String>> = HashMap::new();
        let pairs = stmt.query_map(rusqlite::params![item_id_str], |row| {
          Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for pair in pairs {
          let (user_id, token) = pair?;
          tokens.entry(user_id).or_default().push(token);
        }

        Ok((rows, tokens))
      })
      .await?;

    rows
      .into_iter()
      .map(|(user_id, raw)| {
        Ok(Subscriber {
          user_id:      decode_uuid(&user_id)?,
          tracked_item: raw.into_tracked_item()?,
          push_tokens:  tokens.remove(&user_id).unwrap_or_default(),
        })
      })
      .collect()
  }

  async fn increment_notification_counters(
    &self,
    user_ids:    Vec<Uuid>,
    item_id:     Uuid,
    dispatch_id: String,
  ) -> Result<usize> {
    let mut seen = HashSet::new();
    let user_strs: Vec<String> = user_ids
      .into_iter()
      .filter(|id| seen.insert(*id))
      .map(encode_uuid)
      .collect();
    let item_id_str = encode_uuid(item_id);
    let now         = Utc::now();
    let at_str      = encode_dt(now);
    let cutoff_str  = encode_dt(now - Duration::days(DISPATCH_RETENTION_DAYS));

    let modified = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM notification_dispatches WHERE recorded_at < ?1",
          rusqlite::params![cutoff_str],
        )?;
        let mut modified = 0;
        for user_id in &user_strs {
          // The ledger row makes a replayed dispatch a no-op for this user.
          let fresh = tx.execute(
            "INSERT INTO notification_dispatches (dispatch_id, user_id, item_id, recorded_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (dispatch_id, user_id) DO NOTHING",
            rusqlite::params![dispatch_id, user_id, item_id_str, at_str],
          )?;
          if fresh == 0 {
            continue;
          }
          modified += tx.execute(
            "UPDATE tracked_items SET
               notification_count       = notification_count + 1,
               notification_count_total = notification_count_total + 1,
               last_notified_at         = ?3
             WHERE user_id = ?1 AND item_id = ?2",
            rusqlite::params![user_id, item_id_str, at_str],
          )?;
        }
        tx.commit()?;
        Ok(modified)
      })
      .await?;

    tracing::debug!(%item_id, modified, "notification counters incremented");
    Ok(modified)
  }
}
