//! Header validation and per-field parsing of the insurance CSV.
//!
//! Pipeline:
//!   bytes
//!     └─ csv::Reader (trimmed)
//!          └─ resolve_columns()  → Columns (header positions)
//!               └─ parse_row()   → RawRecord

use std::io::Read;

use inscost_core::record::RawRecord;

use crate::error::{Error, Result};

pub(crate) const REQUIRED: [&str; 7] =
  ["age", "sex", "bmi", "children", "smoker", "region", "charges"];

// ─── Header positions ────────────────────────────────────────────────────────

struct Columns {
  age:      usize,
  sex:      usize,
  bmi:      usize,
  children: usize,
  smoker:   usize,
  region:   usize,
  charges:  usize,
}

/// Locate each required column; header names are compared trimmed and
/// case-insensitively, extra columns are ignored.
fn resolve_columns(headers: &csv::StringRecord) -> Result<Columns> {
  let position = |name: &str| {
    headers
      .iter()
      .position(|h| h.trim().eq_ignore_ascii_case(name))
      .ok_or_else(|| Error::Schema {
        line:    1,
        column:  Some(name.to_owned()),
        message: "required column is missing".into(),
      })
  };

  Ok(Columns {
    age:      position("age")?,
    sex:      position("sex")?,
    bmi:      position("bmi")?,
    children: position("children")?,
    smoker:   position("smoker")?,
    region:   position("region")?,
    charges:  position("charges")?,
  })
}

// ─── Field helpers ───────────────────────────────────────────────────────────

fn field<'r>(row: &'r csv::StringRecord, idx: usize, name: &str, line: u64) -> Result<&'r str> {
  row.get(idx).ok_or_else(|| Error::Schema {
    line,
    column: Some(name.to_owned()),
    message: "value is missing".into(),
  })
}

fn parse_field<T: std::str::FromStr>(
  row: &csv::StringRecord,
  idx: usize,
  name: &str,
  kind: &str,
  line: u64,
) -> Result<T> {
  let raw = field(row, idx, name, line)?;
  raw.parse().map_err(|_| Error::Schema {
    line,
    column: Some(name.to_owned()),
    message: format!("expected {kind}, found {raw:?}"),
  })
}

fn text_field(row: &csv::StringRecord, idx: usize, name: &str, line: u64) -> Result<String> {
  let raw = field(row, idx, name, line)?;
  if raw.is_empty() {
    return Err(Error::Schema {
      line,
      column: Some(name.to_owned()),
      message: "value is empty".into(),
    });
  }
  Ok(raw.to_owned())
}

/// A measure: any `f64` literal except `NaN` and the infinities.
fn finite_field(row: &csv::StringRecord, idx: usize, name: &str, line: u64) -> Result<f64> {
  let value: f64 = parse_field(row, idx, name, "a number", line)?;
  if !value.is_finite() {
    return Err(Error::Schema {
      line,
      column: Some(name.to_owned()),
      message: format!("expected a finite number, found {value}"),
    });
  }
  Ok(value)
}

fn parse_row(row: &csv::StringRecord, cols: &Columns, line: u64) -> Result<RawRecord> {
  let smoker = text_field(row, cols.smoker, "smoker", line)?.to_ascii_lowercase();
  if smoker != "yes" && smoker != "no" {
    return Err(Error::Schema {
      line,
      column: Some("smoker".into()),
      message: format!("expected \"yes\" or \"no\", found {smoker:?}"),
    });
  }

  Ok(RawRecord {
    line,
    age: parse_field(row, cols.age, "age", "an integer", line)?,
    sex: text_field(row, cols.sex, "sex", line)?.to_ascii_lowercase(),
    bmi: finite_field(row, cols.bmi, "bmi", line)?,
    children: parse_field(row, cols.children, "children", "a non-negative integer", line)?,
    smoker,
    region: text_field(row, cols.region, "region", line)?.to_ascii_lowercase(),
    charges: finite_field(row, cols.charges, "charges", line)?,
  })
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub(crate) fn read_records(input: impl Read) -> Result<Vec<RawRecord>> {
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .from_reader(input);

  let cols = resolve_columns(reader.headers()?)?;

  let mut records = Vec::new();
  for row in reader.records() {
    let row = row?;
    let line = row.position().map_or(0, |p| p.line());
    records.push(parse_row(&row, &cols, line)?);
  }
  Ok(records)
}
