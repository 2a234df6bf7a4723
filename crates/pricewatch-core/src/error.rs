//! Error types for `pricewatch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid url {url:?}: {source}")]
  InvalidUrl {
    url:    String,
    #[source]
    source: url::ParseError,
  },

  #[error("unsupported site url: {0}")]
  UnsupportedSite(String),

  #[error("unknown site discriminant: {0:?}")]
  UnknownSite(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
