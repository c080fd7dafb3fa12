//! Dimension resolution: map every natural key in a batch to a surrogate key,
//! creating dimension rows only for keys the store has not seen.
//!
//! The store guarantees uniqueness of natural keys. When another writer
//! inserts one of our missing keys between our read and our insert, the
//! store rejects the whole insert with `DimensionWriteConflict` and the
//! resolver starts over from the read.

use std::{collections::HashSet, time::Duration};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  dimension::{Dimension, DimensionMapping},
  store::Warehouse,
};

// ─── Retry policy ────────────────────────────────────────────────────────────

/// Bounded retry with linear backoff for dimension write conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  pub max_attempts:    u32,
  pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 4, base_backoff_ms: 50 }
  }
}

impl RetryPolicy {
  pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
    Duration::from_millis(self.base_backoff_ms.saturating_mul(u64::from(attempt)))
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// The outcome of resolving one dimension.
#[derive(Debug, Clone)]
pub struct Resolution {
  /// Covers exactly the requested natural keys.
  pub mapping:  DimensionMapping,
  /// Dimension rows inserted by this resolution.
  pub created:  usize,
  pub attempts: u32,
}

/// What the store already holds for a batch of natural keys.
#[derive(Debug, Clone)]
pub struct Plan {
  /// Every stored member of the dimension.
  pub known:   DimensionMapping,
  /// Distinct requested keys with no stored row, in first-seen order.
  pub missing: Vec<String>,
}

/// Read the stored members of `dimension` and diff them against
/// `natural_keys`. Never writes.
pub async fn plan<W: Warehouse>(
  store: &W,
  dimension: Dimension,
  natural_keys: &[String],
) -> Result<Plan> {
  let existing = store.dimension_members(dimension).await.map_err(Into::<Error>::into)?;
  let known = DimensionMapping::from_pairs(dimension, existing);

  let mut seen = HashSet::new();
  let missing = natural_keys
    .iter()
    .filter(|k| known.get(k).is_none() && seen.insert(k.as_str()))
    .cloned()
    .collect();

  Ok(Plan { known, missing })
}

/// Resolve `natural_keys` for `dimension` against `store`.
///
/// Existing surrogate keys are never changed, and each missing natural key is
/// inserted at most once. Works the same on an empty and a populated table.
pub async fn resolve<W: Warehouse>(
  store: &W,
  dimension: Dimension,
  natural_keys: &[String],
  policy: &RetryPolicy,
) -> Result<Resolution> {
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 0;

  loop {
    attempt += 1;

    let Plan { mut known, missing } = plan(store, dimension, natural_keys).await?;

    let created = if missing.is_empty() {
      0
    } else {
      match store
        .insert_dimension_members(dimension, missing)
        .await
        .map_err(Into::<Error>::into)
      {
        Ok(inserted) => {
          let created = inserted.len();
          for (key, id) in inserted {
            known.insert(key, id);
          }
          created
        }
        Err(err) if err.is_conflict() && attempt < max_attempts => {
          warn!(%dimension, attempt, error = %err, "dimension write conflict, retrying");
          tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
          continue;
        }
        Err(err) => return Err(err),
      }
    };

    let mut mapping = DimensionMapping::new(dimension);
    for key in natural_keys {
      let id = known.require(key)?;
      mapping.insert(key.clone(), id);
    }

    debug!(%dimension, keys = mapping.len(), created, attempt, "dimension resolved");
    return Ok(Resolution { mapping, created, attempts: attempt });
  }
}
