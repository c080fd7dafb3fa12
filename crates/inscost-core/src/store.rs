//! The `Warehouse` trait and its read-side row types.
//!
//! The trait is implemented by storage backends (e.g. `inscost-store-sqlite`).
//! The pipeline depends on this abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  batch::{CommittedBatch, LoadBatch},
  dimension::{Dimension, SurrogateKey},
  fact::{Assembly, FactRow},
  run::RunRecord,
};

// ─── Read-side rows ──────────────────────────────────────────────────────────

/// One row of the flattened fact + dimension join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
  /// Age group label.
  pub age:      String,
  pub sex:      String,
  pub bmi:      f64,
  /// Child count.
  pub children: i64,
  /// Smoker status.
  pub smoker:   String,
  pub charges:  f64,
  pub region:   String,
}

/// Mean charges for one natural key of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeAverage {
  pub key:          String,
  pub facts:        u64,
  pub mean_charges: f64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the relational star-schema store.
///
/// Dimension rows are only ever inserted, never updated or deleted; the
/// natural-key column of every dimension is unique. Fact rows are append-only.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait Warehouse: Send + Sync {
  /// Conflicts must convert to [`crate::Error::DimensionWriteConflict`] so the
  /// resolver can recognise and retry them.
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Dimensions ────────────────────────────────────────────────────────

  /// All `(natural key, surrogate key)` pairs currently stored for
  /// `dimension`.
  fn dimension_members(
    &self,
    dimension: Dimension,
  ) -> impl Future<Output = Result<Vec<(String, SurrogateKey)>, Self::Error>> + Send + '_;

  /// Insert one row per natural key in a single transaction and return the
  /// assigned surrogate keys.
  ///
  /// If any key already exists the whole batch is rolled back and a
  /// `DimensionWriteConflict` is returned; nothing is inserted.
  fn insert_dimension_members(
    &self,
    dimension: Dimension,
    natural_keys: Vec<String>,
  ) -> impl Future<Output = Result<Vec<(String, SurrogateKey)>, Self::Error>> + Send + '_;

  // ── Facts ────────────────────────────────────────────────────────────

  /// Append all rows atomically: either every row is committed or none.
  /// Returns the number of rows written.
  fn load_facts(
    &self,
    facts: Vec<FactRow>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Run-scoped unit ───────────────────────────────────────────────

  /// Write one run as a single transaction: insert every key in
  /// `batch.missing`, assemble the batch's facts with the completed
  /// mappings, pass the assembly to `accept`, then append the facts.
  ///
  /// Any failure rolls back both the dimension rows and the facts. A UNIQUE
  /// clash is a `DimensionWriteConflict`, an error from `accept` is returned
  /// as is, and a failed fact insert is a `LoadFailure`.
  fn commit_batch<F>(
    &self,
    batch: LoadBatch,
    accept: F,
  ) -> impl Future<Output = Result<CommittedBatch, Self::Error>> + Send + '_
  where
    F: FnOnce(&Assembly) -> crate::Result<()> + Send + 'static;

  // ── Run ledger ────────────────────────────────────────────────────────

  /// Record the outcome of one pipeline run.
  fn record_run(
    &self,
    run: RunRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Most recent runs first.
  fn runs(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RunRecord>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn fact_count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The flattened join of facts with their dimension labels.
  fn flattened(
    &self,
  ) -> impl Future<Output = Result<Vec<FlatRow>, Self::Error>> + Send + '_;

  /// Fact count and mean charges per natural key of `dimension`, ordered by
  /// natural key.
  fn average_charges(
    &self,
    dimension: Dimension,
  ) -> impl Future<Output = Result<Vec<ChargeAverage>, Self::Error>> + Send + '_;

  /// Region labels known to the store, sorted.
  fn regions(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}
