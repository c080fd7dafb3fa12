//! The five dimensions of the star schema and natural-key → surrogate-key
//! mappings.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A surrogate key assigned by the store.
pub type SurrogateKey = i64;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
  Age,
  Sex,
  Smoker,
  Region,
  Children,
}

impl Dimension {
  /// Resolution order used by the pipeline.
  pub const ALL: [Dimension; 5] = [
    Self::Age,
    Self::Sex,
    Self::Smoker,
    Self::Region,
    Self::Children,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Self::Age => "age",
      Self::Sex => "sex",
      Self::Smoker => "smoker",
      Self::Region => "region",
      Self::Children => "children",
    }
  }
}

impl fmt::Display for Dimension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Dimension {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|d| d.name().eq_ignore_ascii_case(s))
      .ok_or_else(|| Error::OutOfRangeValue {
        field:    "dimension",
        value:    format!("{s:?}"),
        expected: "one of age, sex, smoker, region, children",
      })
  }
}

// ─── Mappings ────────────────────────────────────────────────────────────────

/// Natural key → surrogate key for one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMapping {
  pub dimension: Dimension,
  keys:          HashMap<String, SurrogateKey>,
}

impl DimensionMapping {
  pub fn new(dimension: Dimension) -> Self {
    Self { dimension, keys: HashMap::new() }
  }

  pub fn from_pairs(
    dimension: Dimension,
    pairs: impl IntoIterator<Item = (String, SurrogateKey)>,
  ) -> Self {
    Self { dimension, keys: pairs.into_iter().collect() }
  }

  pub fn get(&self, natural_key: &str) -> Option<SurrogateKey> {
    self.keys.get(natural_key).copied()
  }

  /// Like [`get`](Self::get), but a miss is an `UnresolvedDimensionKey`.
  pub fn require(&self, natural_key: &str) -> Result<SurrogateKey> {
    self.get(natural_key).ok_or_else(|| Error::UnresolvedDimensionKey {
      dimension: self.dimension,
      value:     natural_key.to_owned(),
    })
  }

  pub fn insert(&mut self, natural_key: String, id: SurrogateKey) {
    self.keys.insert(natural_key, id);
  }

  pub fn len(&self) -> usize { self.keys.len() }

  pub fn is_empty(&self) -> bool { self.keys.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&str, SurrogateKey)> {
    self.keys.iter().map(|(k, v)| (k.as_str(), *v))
  }
}

/// One [`DimensionMapping`] per dimension, as produced by the resolver.
#[derive(Debug, Clone, Default)]
pub struct KeyMappings {
  inner: HashMap<Dimension, DimensionMapping>,
}

impl KeyMappings {
  pub fn insert(&mut self, mapping: DimensionMapping) {
    self.inner.insert(mapping.dimension, mapping);
  }

  pub fn get(&self, dimension: Dimension) -> Option<&DimensionMapping> {
    self.inner.get(&dimension)
  }

  /// The mapping for `dimension`, created empty if absent.
  pub fn entry(&mut self, dimension: Dimension) -> &mut DimensionMapping {
    self
      .inner
      .entry(dimension)
      .or_insert_with(|| DimensionMapping::new(dimension))
  }

  /// Look up a surrogate key; a missing mapping or value is unresolved.
  pub fn key(&self, dimension: Dimension, natural_key: &str) -> Result<SurrogateKey> {
    match self.inner.get(&dimension) {
      Some(mapping) => mapping.require(natural_key),
      None => Err(Error::UnresolvedDimensionKey {
        dimension,
        value: natural_key.to_owned(),
      }),
    }
  }
}
