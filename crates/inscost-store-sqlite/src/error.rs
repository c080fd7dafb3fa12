//! Error type for `inscost-store-sqlite`.

use inscost_core::dimension::Dimension;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] inscost_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A natural key that cannot be stored in its dimension's column type.
  #[error("invalid natural key {value:?} for {dimension} dimension")]
  InvalidNaturalKey { dimension: Dimension, value: String },

  #[error("unknown run outcome: {0:?}")]
  UnknownOutcome(String),
}

/// Taxonomy errors pass through unchanged; everything else is a store error.
impl From<Error> for inscost_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(core) => core,
      other => inscost_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
