//! Error type for the tracker pipeline and its adapters.

use pricewatch_core::provider::{NotifierError, ProviderError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] pricewatch_core::Error),

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error(transparent)]
  Notifier(#[from] NotifierError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("user {0} not found")]
  UserNotFound(Uuid),

  #[error("user {0} already tracks the maximum number of items")]
  TrackedItemLimit(Uuid),
}

impl Error {
  /// Box a store backend's error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
