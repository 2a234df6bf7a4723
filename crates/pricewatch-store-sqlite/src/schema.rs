//! SQL schema for the pricewatch SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per product listing. The identity triple is the conflict signal for
-- concurrent inserts; updated_at is the compare-and-swap token for replaces.
CREATE TABLE IF NOT EXISTS items (
    item_id                TEXT PRIMARY KEY,
    site                   TEXT NOT NULL,   -- 'shopee' | 'tokopedia' | 'blibli'
    merchant_id            TEXT NOT NULL,
    product_id             TEXT NOT NULL,
    url                    TEXT NOT NULL,
    name                   TEXT NOT NULL,
    price                  INTEGER NOT NULL,
    stock                  INTEGER NOT NULL,
    image_url              TEXT NOT NULL DEFAULT '',
    description            TEXT NOT NULL DEFAULT '',
    rating                 REAL NOT NULL DEFAULT 0,
    sold_count             INTEGER NOT NULL DEFAULT 0,
    price_history_previous INTEGER NOT NULL,
    price_history_highest  INTEGER NOT NULL,
    price_history_lowest   INTEGER NOT NULL,
    price_last_changed_at  TEXT NOT NULL,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    UNIQUE (site, merchant_id, product_id),
    CHECK  (price_history_lowest <= price AND price <= price_history_highest)
);

-- Strictly append-only. No UPDATE or DELETE is ever issued against this table.
-- recorded_at is non-decreasing per item; equal stamps are allowed.
CREATE TABLE IF NOT EXISTS item_history (
    history_id  TEXT PRIMARY KEY,
    item_id     TEXT NOT NULL REFERENCES items(item_id),
    price       INTEGER NOT NULL,
    stock       INTEGER NOT NULL,
    rating      REAL NOT NULL,
    sold_count  INTEGER NOT NULL,
    recorded_at TEXT NOT NULL    -- fixed-width RFC 3339 UTC, sorts lexically
);

CREATE TABLE IF NOT EXISTS users (
    user_id    TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    email      TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- At most 5 per user, trimmed by last_seen in the same transaction as the
-- insert.
CREATE TABLE IF NOT EXISTS devices (
    user_id    TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    device_id  TEXT NOT NULL,
    push_token TEXT,
    last_seen  TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, device_id)
);

-- At most one subscription per (user, item). item_id is a weak reference.
CREATE TABLE IF NOT EXISTS tracked_items (
    user_id                  TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    item_id                  TEXT NOT NULL,
    price_lower_threshold    INTEGER NOT NULL,
    notification_enabled     INTEGER NOT NULL,
    notification_count       INTEGER NOT NULL DEFAULT 0,
    notification_count_total INTEGER NOT NULL DEFAULT 0,
    last_notified_at         TEXT,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    PRIMARY KEY (user_id, item_id)
);

-- Ledger of which users were credited for which dispatch.
CREATE TABLE IF NOT EXISTS notification_dispatches (
    dispatch_id TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    item_id     TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (dispatch_id, user_id)
);

CREATE INDEX IF NOT EXISTS items_site_idx            ON items(site);
CREATE INDEX IF NOT EXISTS history_item_recorded_idx ON item_history(item_id, recorded_at);
CREATE INDEX IF NOT EXISTS tracked_items_item_idx    ON tracked_items(item_id);
CREATE UNIQUE INDEX IF NOT EXISTS devices_push_token_idx
    ON devices(push_token) WHERE push_token IS NOT NULL;

PRAGMA user_version = 1;
";
