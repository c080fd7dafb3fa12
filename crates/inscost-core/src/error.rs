//! Error types for `inscost-core`.
//!
//! These variants form the pipeline's error taxonomy. Backends and the
//! extractor convert their own failures into one of them.

use thiserror::Error;

use crate::dimension::Dimension;

#[derive(Debug, Error)]
pub enum Error {
  #[error("source unavailable: {location}: {reason}")]
  SourceUnavailable { location: String, reason: String },

  /// A required column is missing or a value has the wrong primitive type.
  #[error("schema mismatch at line {line}{}: {message}", column_suffix(.column))]
  SchemaMismatch {
    line:    u64,
    column:  Option<String>,
    message: String,
  },

  #[error("{field} value {value} is out of range (expected {expected})")]
  OutOfRangeValue {
    field:    &'static str,
    value:    String,
    expected: &'static str,
  },

  /// Another writer inserted the same natural key first.
  #[error("write conflict on {dimension} dimension for natural key {value:?}")]
  DimensionWriteConflict { dimension: Dimension, value: String },

  #[error("no surrogate key for {dimension} natural key {value:?}")]
  UnresolvedDimensionKey { dimension: Dimension, value: String },

  #[error("fact load failed: {0}")]
  LoadFailure(String),

  #[error(
    "{rejected} of {total} records rejected, above the allowed fraction {threshold}"
  )]
  RejectionThresholdExceeded {
    rejected:  usize,
    total:     usize,
    threshold: f64,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::DimensionWriteConflict { .. })
  }
}

fn column_suffix(column: &Option<String>) -> String {
  column
    .as_deref()
    .map(|c| format!(", column {c:?}"))
    .unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
