//! Age binning into the four fixed age groups.
//!
//! Bins are closed on the upper end: (0,25], (25,35], (35,50], (50,100].
//! Anything outside (0,100] is rejected instead of being clamped.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AgeGroup {
  #[serde(rename = "18-25")]
  UpTo25,
  #[serde(rename = "26-35")]
  UpTo35,
  #[serde(rename = "36-50")]
  UpTo50,
  #[serde(rename = "50+")]
  Over50,
}

impl AgeGroup {
  pub const ALL: [AgeGroup; 4] =
    [Self::UpTo25, Self::UpTo35, Self::UpTo50, Self::Over50];

  /// Bin an age. Boundary values belong to the lower bin.
  pub fn from_age(age: i64) -> Result<Self> {
    match age {
      1..=25 => Ok(Self::UpTo25),
      26..=35 => Ok(Self::UpTo35),
      36..=50 => Ok(Self::UpTo50),
      51..=100 => Ok(Self::Over50),
      other => Err(Error::OutOfRangeValue {
        field:    "age",
        value:    other.to_string(),
        expected: "1..=100",
      }),
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::UpTo25 => "18-25",
      Self::UpTo35 => "26-35",
      Self::UpTo50 => "36-50",
      Self::Over50 => "50+",
    }
  }
}

impl fmt::Display for AgeGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for AgeGroup {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|g| g.label() == s)
      .ok_or_else(|| Error::OutOfRangeValue {
        field:    "age_group",
        value:    format!("{s:?}"),
        expected: "one of 18-25, 26-35, 36-50, 50+",
      })
  }
}
