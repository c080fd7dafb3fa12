//! Fact rows and fact assembly.
//!
//! A fact row is one source record with every natural key replaced by the
//! surrogate key of its dimension. Measures (`bmi`, `charges`) are carried
//! through unchanged. Fact rows are append-only in the store.

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  dimension::{Dimension, KeyMappings, SurrogateKey},
  record::BinnedRecord,
};

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One row of `fact_insurance`, at the grain of one source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
  pub age_id:      SurrogateKey,
  pub sex_id:      SurrogateKey,
  pub bmi:         f64,
  pub children_id: SurrogateKey,
  pub smoker_id:   SurrogateKey,
  pub region_id:   SurrogateKey,
  pub charges:     f64,
}

// ─── Rejections ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
  OutOfRangeValue,
  UnresolvedDimensionKey,
}

/// A source record excluded from the load, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
  pub line:   u64,
  pub kind:   RejectionKind,
  pub reason: String,
}

impl Rejection {
  /// Build a rejection from a per-record error. Returns the error back if it
  /// is not one that excludes only a single record.
  pub fn from_error(line: u64, err: Error) -> Result<Self, Error> {
    let kind = match &err {
      Error::OutOfRangeValue { .. } => RejectionKind::OutOfRangeValue,
      Error::UnresolvedDimensionKey { .. } => RejectionKind::UnresolvedDimensionKey,
      _ => return Err(err),
    };
    Ok(Self { line, kind, reason: err.to_string() })
  }
}

// ─── Assembly ────────────────────────────────────────────────────────────────

/// Output of [`assemble`]: fact rows in source order plus excluded records.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
  pub facts:    Vec<FactRow>,
  pub rejected: Vec<Rejection>,
}

/// Substitute surrogate keys for natural keys, record by record.
///
/// A record with any unmapped natural key is excluded as a whole; it never
/// yields a fact row with a partial set of keys.
pub fn assemble(records: &[BinnedRecord], mappings: &KeyMappings) -> Assembly {
  let mut out = Assembly::default();

  for record in records {
    match assemble_one(record, mappings) {
      Ok(fact) => out.facts.push(fact),
      Err(err) => out.rejected.push(Rejection {
        line:   record.record.line,
        kind:   RejectionKind::UnresolvedDimensionKey,
        reason: err.to_string(),
      }),
    }
  }

  out
}

fn assemble_one(record: &BinnedRecord, mappings: &KeyMappings) -> Result<FactRow, Error> {
  let key = |d: Dimension| mappings.key(d, &record.natural_key(d));

  Ok(FactRow {
    age_id:      key(Dimension::Age)?,
    sex_id:      key(Dimension::Sex)?,
    bmi:         record.record.bmi,
    children_id: key(Dimension::Children)?,
    smoker_id:   key(Dimension::Smoker)?,
    region_id:   key(Dimension::Region)?,
    charges:     record.record.charges,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{dimension::DimensionMapping, record::sample};

  fn mappings() -> KeyMappings {
    let mut m = KeyMappings::default();
    let pairs: [(Dimension, &[(&str, i64)]); 5] = [
      (Dimension::Age, &[("18-25", 1), ("26-35", 2)]),
      (Dimension::Sex, &[("female", 1), ("male", 2)]),
      (Dimension::Smoker, &[("no", 1)]),
      (Dimension::Region, &[("northeast", 1)]),
      (Dimension::Children, &[("2", 7)]),
    ];
    for (dimension, keys) in pairs {
      m.insert(DimensionMapping::from_pairs(
        dimension,
        keys.iter().map(|(k, v)| ((*k).to_owned(), *v)),
      ));
    }
    m
  }

  #[test]
  fn substitutes_keys_and_carries_measures() {
    let records = vec![
      sample(2, 31, "female", "northeast").bin().unwrap(),
      sample(3, 20, "male", "northeast").bin().unwrap(),
    ];
    let assembly = assemble(&records, &mappings());

    assert!(assembly.rejected.is_empty());
    assert_eq!(assembly.facts, vec![
      FactRow {
        age_id:      2,
        sex_id:      1,
        bmi:         27.5,
        children_id: 7,
        smoker_id:   1,
        region_id:   1,
        charges:     5432.10,
      },
      FactRow {
        age_id:      1,
        sex_id:      2,
        bmi:         27.5,
        children_id: 7,
        smoker_id:   1,
        region_id:   1,
        charges:     5432.10,
      },
    ]);
  }

  #[test]
  fn unmapped_key_excludes_only_that_record() {
    let records = vec![
      sample(2, 31, "female", "northeast").bin().unwrap(),
      sample(3, 31, "female", "atlantis").bin().unwrap(),
      sample(4, 31, "male", "northeast").bin().unwrap(),
    ];
    let assembly = assemble(&records, &mappings());

    assert_eq!(assembly.facts.len(), 2);
    assert_eq!(assembly.rejected.len(), 1);
    let rejection = &assembly.rejected[0];
    assert_eq!(rejection.line, 3);
    assert_eq!(rejection.kind, RejectionKind::UnresolvedDimensionKey);
    assert!(rejection.reason.contains("atlantis"));
  }

  #[test]
  fn rejection_from_error_keeps_store_errors() {
    let out_of_range = crate::age::AgeGroup::from_age(0).unwrap_err();
    assert_eq!(
      Rejection::from_error(9, out_of_range).unwrap().kind,
      RejectionKind::OutOfRangeValue
    );
    assert!(Rejection::from_error(9, Error::LoadFailure("disk full".into())).is_err());
  }
}
