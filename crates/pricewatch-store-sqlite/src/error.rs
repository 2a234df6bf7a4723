//! Error type for `pricewatch-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] pricewatch_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("column out of range: {0}")]
  OutOfRange(String),

  #[error("store is inconsistent: {0}")]
  Inconsistent(String),

  #[error("history record {history_id} already exists")]
  DuplicateHistory { history_id: uuid::Uuid },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
