//! Error types for the CSV extractor.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot read {path:?}: {cause}")]
  Open {
    path:  PathBuf,
    #[source]
    cause: std::io::Error,
  },

  #[error("line {line}{}: {message}", column_suffix(.column))]
  Schema {
    line:    u64,
    column:  Option<String>,
    message: String,
  },

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),
}

impl From<Error> for inscost_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Open { path, cause } => inscost_core::Error::SourceUnavailable {
        location: path.display().to_string(),
        reason:   cause.to_string(),
      },
      Error::Schema { line, column, message } => {
        inscost_core::Error::SchemaMismatch { line, column, message }
      }
      Error::Csv(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
        inscost_core::Error::SourceUnavailable {
          location: "input stream".into(),
          reason:   e.to_string(),
        }
      }
      Error::Csv(e) => {
        let line = e.position().map_or(0, |p| p.line());
        inscost_core::Error::SchemaMismatch { line, column: None, message: e.to_string() }
      }
    }
  }
}

fn column_suffix(column: &Option<String>) -> String {
  column
    .as_deref()
    .map(|c| format!(", column {c:?}"))
    .unwrap_or_default()
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
