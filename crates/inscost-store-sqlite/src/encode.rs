//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. UUIDs are stored as
//! hyphenated lowercase strings. Natural keys travel as text in the domain
//! and are bound with their column's SQLite type.

use chrono::{DateTime, SecondsFormat, Utc};
use inscost_core::{
  dimension::Dimension,
  run::{RunOutcome, RunRecord},
};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Dimension tables ────────────────────────────────────────────────────────

/// Table and column names of one dimension.
#[derive(Debug, Clone, Copy)]
pub struct DimensionTable {
  pub table:       &'static str,
  pub id_column:   &'static str,
  pub key_column:  &'static str,
  /// `true` when the natural key column is `INTEGER` rather than `TEXT`.
  pub integer_key: bool,
}

pub fn dimension_table(d: Dimension) -> DimensionTable {
  let (table, id_column, key_column, integer_key) = match d {
    Dimension::Age => ("dim_age", "age_id", "age_group", false),
    Dimension::Sex => ("dim_sex", "sex_id", "sex", false),
    Dimension::Smoker => ("dim_smoker", "smoker_id", "status", false),
    Dimension::Region => ("dim_region", "region_id", "region", false),
    Dimension::Children => ("dim_children", "children_id", "child_count", true),
  };
  DimensionTable { table, id_column, key_column, integer_key }
}

/// Bind a natural key with the column type of its dimension.
pub fn encode_natural_key(d: Dimension, key: &str) -> Result<Value> {
  if dimension_table(d).integer_key {
    key
      .parse::<i64>()
      .ok()
      .filter(|n| *n >= 0)
      .map(Value::Integer)
      .ok_or_else(|| Error::InvalidNaturalKey { dimension: d, value: key.to_owned() })
  } else {
    Ok(Value::Text(key.to_owned()))
  }
}

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width nanoseconds so stored timestamps sort as text.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── RunOutcome ──────────────────────────────────────────────────────────────

pub fn decode_outcome(s: &str) -> Result<RunOutcome> {
  match s {
    "committed" => Ok(RunOutcome::Committed),
    "aborted" => Ok(RunOutcome::Aborted),
    other => Err(Error::UnknownOutcome(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `etl_runs` row.
pub struct RawRun {
  pub run_id:           String,
  pub started_at:       String,
  pub finished_at:      String,
  pub source:           String,
  pub source_sha256:    String,
  pub records_read:     i64,
  pub records_rejected: i64,
  pub facts_loaded:     i64,
  pub outcome:          String,
  pub error:            Option<String>,
}

impl RawRun {
  pub fn into_run(self) -> Result<RunRecord> {
    Ok(RunRecord {
      run_id:           decode_uuid(&self.run_id)?,
      started_at:       decode_dt(&self.started_at)?,
      finished_at:      decode_dt(&self.finished_at)?,
      source:           self.source,
      source_sha256:    self.source_sha256,
      records_read:     self.records_read.max(0) as u64,
      records_rejected: self.records_rejected.max(0) as u64,
      facts_loaded:     self.facts_loaded.max(0) as u64,
      outcome:          decode_outcome(&self.outcome)?,
      error:            self.error,
    })
  }
}
