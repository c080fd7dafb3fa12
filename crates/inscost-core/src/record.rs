//! Raw records as read from the source, and records with their age binned.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{Result, age::AgeGroup, dimension::Dimension};

/// One row of the flat source dataset. Immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
  /// 1-based line in the source, counting the header as line 1.
  pub line:     u64,
  pub age:      i64,
  pub sex:      String,
  pub bmi:      f64,
  pub children: u32,
  /// `"yes"` or `"no"`; the extractor rejects anything else.
  pub smoker:   String,
  pub region:   String,
  pub charges:  f64,
}

impl RawRecord {
  /// Attach the age group; fails with `OutOfRangeValue` for ages outside
  /// (0,100].
  pub fn bin(self) -> Result<BinnedRecord> {
    let age_group = AgeGroup::from_age(self.age)?;
    Ok(BinnedRecord { record: self, age_group })
  }
}

/// A raw record together with its derived age group.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedRecord {
  pub record:    RawRecord,
  pub age_group: AgeGroup,
}

impl BinnedRecord {
  /// The natural key this record carries for `dimension`.
  pub fn natural_key(&self, dimension: Dimension) -> Cow<'_, str> {
    match dimension {
      Dimension::Age => Cow::Borrowed(self.age_group.label()),
      Dimension::Sex => Cow::Borrowed(&self.record.sex),
      Dimension::Smoker => Cow::Borrowed(&self.record.smoker),
      Dimension::Region => Cow::Borrowed(&self.record.region),
      Dimension::Children => Cow::Owned(self.record.children.to_string()),
    }
  }
}

/// Distinct natural keys for `dimension`, in first-seen order.
pub fn distinct_keys(records: &[BinnedRecord], dimension: Dimension) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  records
    .iter()
    .map(|r| r.natural_key(dimension))
    .filter(|k| seen.insert(k.to_string()))
    .map(Cow::into_owned)
    .collect()
}

#[cfg(test)]
pub(crate) fn sample(line: u64, age: i64, sex: &str, region: &str) -> RawRecord {
  RawRecord {
    line,
    age,
    sex: sex.into(),
    bmi: 27.5,
    children: 2,
    smoker: "no".into(),
    region: region.into(),
    charges: 5432.10,
  }
}
