//! CSV extractor for the inscost pipeline.
//!
//! Reads the flat insurance dataset into [`RawRecord`]s. Pure synchronous;
//! no database dependencies. Reading is the only side effect.
//!
//! # Quick start
//!
//! ```no_run
//! let source = inscost_csv::extract("data/insurance.csv").unwrap();
//! println!("{} records, sha256 {}", source.records.len(), source.sha256);
//! ```

pub mod error;
mod parse;

use std::{io::Read, path::Path};

pub use error::{Error, Result};
use inscost_core::record::RawRecord;
use sha2::{Digest, Sha256};

/// The header names the extractor requires.
pub const REQUIRED_COLUMNS: [&str; 7] = parse::REQUIRED;

// ─── Public types ────────────────────────────────────────────────────────────

/// An extracted source file.
#[derive(Debug, Clone)]
pub struct Extracted {
  pub records: Vec<RawRecord>,
  /// Lowercase hex SHA-256 of the raw file bytes.
  pub sha256:  String,
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Read and fingerprint the CSV file at `path`.
pub fn extract(path: impl AsRef<Path>) -> Result<Extracted> {
  let path = path.as_ref();
  let bytes = std::fs::read(path).map_err(|cause| Error::Open {
    path: path.to_path_buf(),
    cause,
  })?;

  let sha256 = hex::encode(Sha256::digest(&bytes));
  let records = parse::read_records(bytes.as_slice())?;
  Ok(Extracted { records, sha256 })
}

/// Read records from any stream, without fingerprinting.
pub fn extract_reader(input: impl Read) -> Result<Vec<RawRecord>> {
  parse::read_records(input)
}
