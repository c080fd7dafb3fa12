//! An in-memory [`Warehouse`] for unit tests.

use std::{collections::HashMap, sync::Mutex};

use crate::{
  Error, Result,
  batch::{CommittedBatch, LoadBatch},
  dimension::Dimension,
  fact::{Assembly, FactRow},
  run::RunRecord,
  store::{ChargeAverage, FlatRow, Warehouse},
};

type Rows = Vec<(String, i64)>;

/// In-memory warehouse that can simulate a concurrent writer.
#[derive(Default)]
pub(crate) struct MemoryWarehouse {
  pub dims:            Mutex<HashMap<Dimension, Rows>>,
  pub facts:           Mutex<Vec<FactRow>>,
  /// Keys another writer sneaks in right before our next write.
  pub racing_inserts:  Mutex<Vec<(Dimension, String)>>,
  pub always_conflict: bool,
  pub insert_calls:    Mutex<u32>,
}

impl MemoryWarehouse {
  pub fn seeded(dimension: Dimension, pairs: &[(&str, i64)]) -> Self {
    let w = Self::default();
    w.dims.lock().unwrap().insert(
      dimension,
      pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect(),
    );
    w
  }

  pub fn rows(&self, dimension: Dimension) -> Rows {
    self.dims.lock().unwrap().get(&dimension).cloned().unwrap_or_default()
  }

  fn insert_row(rows: &mut Rows, key: String) -> i64 {
    let id = rows.iter().map(|(_, id)| *id).max().unwrap_or(0) + 1;
    rows.push((key, id));
    id
  }

  fn let_rival_write(&self, dims: &mut HashMap<Dimension, Rows>) {
    for (dimension, key) in self.racing_inserts.lock().unwrap().drain(..) {
      Self::insert_row(dims.entry(dimension).or_default(), key);
    }
  }

  fn clash(&self, rows: &[(String, i64)], keys: &[String]) -> Option<String> {
    keys
      .iter()
      .find(|k| self.always_conflict || rows.iter().any(|(existing, _)| existing == *k))
      .cloned()
  }
}

impl Warehouse for MemoryWarehouse {
  type Error = Error;

  async fn dimension_members(&self, dimension: Dimension) -> Result<Rows> {
    Ok(self.rows(dimension))
  }

  async fn insert_dimension_members(
    &self,
    dimension: Dimension,
    natural_keys: Vec<String>,
  ) -> Result<Rows> {
    *self.insert_calls.lock().unwrap() += 1;
    let mut dims = self.dims.lock().unwrap();
    self.let_rival_write(&mut dims);
    let rows = dims.entry(dimension).or_default();

    if let Some(value) = self.clash(rows, &natural_keys) {
      return Err(Error::DimensionWriteConflict { dimension, value });
    }

    Ok(
      natural_keys
        .into_iter()
        .map(|k| {
          let id = Self::insert_row(rows, k.clone());
          (k, id)
        })
        .collect(),
    )
  }

  async fn load_facts(&self, facts: Vec<FactRow>) -> Result<u64> {
    let n = facts.len() as u64;
    self.facts.lock().unwrap().extend(facts);
    Ok(n)
  }

  async fn commit_batch<F>(&self, batch: LoadBatch, accept: F) -> Result<CommittedBatch>
  where
    F: FnOnce(&Assembly) -> Result<()> + Send + 'static,
  {
    let mut dims = self.dims.lock().unwrap();
    self.let_rival_write(&mut dims);

    // Staged on a copy; dropped unless everything succeeds.
    let mut staged = dims.clone();
    let mut inserted = Vec::new();
    for (dimension, keys) in &batch.missing {
      let rows = staged.entry(*dimension).or_default();
      if let Some(value) = self.clash(rows, keys) {
        return Err(Error::DimensionWriteConflict { dimension: *dimension, value });
      }
      let new_rows: Rows = keys
        .iter()
        .map(|k| (k.clone(), Self::insert_row(rows, k.clone())))
        .collect();
      inserted.push((*dimension, new_rows));
    }

    let assembly = batch.assemble(&inserted);
    accept(&assembly)?;

    *dims = staged;
    let facts_loaded = assembly.facts.len() as u64;
    self.facts.lock().unwrap().extend(assembly.facts);
    Ok(CommittedBatch {
      created: inserted.iter().map(|(d, rows)| (*d, rows.len())).collect(),
      rejected: assembly.rejected,
      facts_loaded,
    })
  }

  async fn record_run(&self, _run: RunRecord) -> Result<()> { Ok(()) }

  async fn runs(&self, _limit: usize) -> Result<Vec<RunRecord>> { Ok(vec![]) }

  async fn fact_count(&self) -> Result<u64> { Ok(self.facts.lock().unwrap().len() as u64) }

  async fn flattened(&self) -> Result<Vec<FlatRow>> { Ok(vec![]) }

  async fn average_charges(&self, _dimension: Dimension) -> Result<Vec<ChargeAverage>> {
    Ok(vec![])
  }

  async fn regions(&self) -> Result<Vec<String>> {
    Ok(self.rows(Dimension::Region).into_iter().map(|(k, _)| k).collect())
  }
}
