//! Loading one run as a single unit of work.
//!
//! Reads happen first and write nothing: for every dimension the stored
//! members are diffed against the run's natural keys. The store then inserts
//! the missing keys and appends the run's facts in one transaction through
//! [`Warehouse::commit_batch`], so an aborted run leaves neither dimension nor
//! fact rows behind. A UNIQUE clash rolls the whole unit back and the run is
//! planned again from fresh reads.

use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, warn};

use crate::{
  Error, Result,
  dimension::{Dimension, KeyMappings, SurrogateKey},
  fact::{Assembly, Rejection, assemble},
  record::{BinnedRecord, distinct_keys},
  resolve::{Plan, RetryPolicy, plan},
  store::Warehouse,
};

// ─── Batch ───────────────────────────────────────────────────────────────────

/// Everything the store needs to write one run.
#[derive(Debug, Clone)]
pub struct LoadBatch {
  /// Stored members of every dimension at planning time.
  pub known:   KeyMappings,
  /// Keys to insert, per dimension in resolution order. Dimensions with
  /// nothing missing are left out.
  pub missing: Vec<(Dimension, Vec<String>)>,
  pub records: Arc<Vec<BinnedRecord>>,
}

impl LoadBatch {
  /// Complete the planned mappings with the rows the store just inserted and
  /// assemble the run's facts.
  pub fn assemble(&self, inserted: &[(Dimension, Vec<(String, SurrogateKey)>)]) -> Assembly {
    let mut mappings = self.known.clone();
    for (dimension, rows) in inserted {
      let mapping = mappings.entry(*dimension);
      for (key, id) in rows {
        mapping.insert(key.clone(), *id);
      }
    }
    assemble(&self.records, &mappings)
  }
}

/// What the store committed for one batch.
#[derive(Debug, Clone, Default)]
pub struct CommittedBatch {
  /// Dimension rows inserted, per dimension.
  pub created:      BTreeMap<Dimension, usize>,
  /// Records the assembler excluded.
  pub rejected:     Vec<Rejection>,
  pub facts_loaded: u64,
}

/// A committed batch and how many attempts it took.
#[derive(Debug, Clone)]
pub struct Loaded {
  pub committed: CommittedBatch,
  pub attempts:  u32,
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// Diff every dimension's stored members against the natural keys of
/// `records`. Never writes.
pub async fn plan_batch<W: Warehouse>(
  store: &W,
  records: Arc<Vec<BinnedRecord>>,
) -> Result<LoadBatch> {
  let mut known = KeyMappings::default();
  let mut missing = Vec::new();

  for dimension in Dimension::ALL {
    let keys = distinct_keys(&records, dimension);
    let Plan { known: mapping, missing: absent } = plan(store, dimension, &keys).await?;
    debug!(%dimension, distinct = keys.len(), missing = absent.len(), "dimension planned");
    known.insert(mapping);
    if !absent.is_empty() {
      missing.push((dimension, absent));
    }
  }

  Ok(LoadBatch { known, missing, records })
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Plan and commit `records` as one unit, retrying the whole unit on
/// dimension write conflicts.
///
/// `accept` sees each assembly inside the store transaction; an error from it
/// aborts the unit with nothing written.
pub async fn load_batch<W, F>(
  store: &W,
  records: Vec<BinnedRecord>,
  policy: &RetryPolicy,
  accept: F,
) -> Result<Loaded>
where
  W: Warehouse,
  F: Fn(&Assembly) -> Result<()> + Clone + Send + 'static,
{
  let records = Arc::new(records);
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 0;

  loop {
    attempt += 1;

    let batch = plan_batch(store, Arc::clone(&records)).await?;
    match store
      .commit_batch(batch, accept.clone())
      .await
      .map_err(Into::<Error>::into)
    {
      Ok(committed) => return Ok(Loaded { committed, attempts: attempt }),
      Err(err) if err.is_conflict() && attempt < max_attempts => {
        warn!(attempt, error = %err, "dimension write conflict, replanning batch");
        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
      }
      Err(err) => return Err(err),
    }
  }
}
