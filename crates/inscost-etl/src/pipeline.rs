//! The extract → transform → load pipeline.
//!
//! Stages run strictly in order against one explicit store handle:
//!
//! 1. extract and fingerprint the source (abort before any write on failure)
//! 2. bin ages; out-of-range records are rejected
//! 3. read each dimension and work out which natural keys are new
//! 4. in one store transaction: insert the new keys, assemble the fact rows
//!    (unresolved records are rejected) and append them
//!
//! The rejection threshold is checked after step 2 and again inside step 4,
//! before any fact is written. An aborted run leaves neither dimension nor
//! fact rows behind. Every run, aborted or committed, is written to the run
//! ledger.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use inscost_core::{
  Error, Result,
  batch::load_batch,
  dimension::Dimension,
  fact::{Assembly, Rejection},
  record::{BinnedRecord, RawRecord},
  resolve::RetryPolicy,
  run::{RunOutcome, RunRecord, RunSummary},
  store::Warehouse,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EtlConfig;

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct Pipeline<'a, W: Warehouse> {
  store:                 &'a W,
  retry:                 RetryPolicy,
  max_rejected_fraction: f64,
}

impl<'a, W: Warehouse> Pipeline<'a, W> {
  pub fn new(store: &'a W, config: &EtlConfig) -> Self {
    Self {
      store,
      retry: config.retry.clone(),
      max_rejected_fraction: config.max_rejected_fraction,
    }
  }

  /// Run the whole pipeline on the CSV file at `source`.
  pub async fn run(&self, source: &Path) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let label = source.display().to_string();
    info!(%run_id, source = %label, "pipeline run started");

    let extracted = match inscost_csv::extract(source) {
      Ok(extracted) => extracted,
      Err(err) => {
        let err = Error::from(err);
        let ledger = Ledger { run_id, started_at, source: label, sha256: String::new() };
        return Err(self.abort(ledger, 0, err).await);
      }
    };

    let ledger = Ledger { run_id, started_at, source: label, sha256: extracted.sha256 };
    self.run_records(ledger, extracted.records).await
  }

  /// Run transform and load on records that were already extracted.
  pub async fn run_extracted(
    &self,
    source: impl Into<String>,
    sha256: impl Into<String>,
    records: Vec<RawRecord>,
  ) -> Result<RunSummary> {
    let ledger = Ledger {
      run_id:     Uuid::new_v4(),
      started_at: Utc::now(),
      source:     source.into(),
      sha256:     sha256.into(),
    };
    self.run_records(ledger, records).await
  }

  async fn run_records(&self, ledger: Ledger, records: Vec<RawRecord>) -> Result<RunSummary> {
    let records_read = records.len();

    match self.transform_and_load(ledger.run_id, records).await {
      Ok((dimensions_created, facts_loaded, rejected)) => {
        let summary = RunSummary {
          run_id: ledger.run_id,
          source: ledger.source.clone(),
          source_sha256: ledger.sha256.clone(),
          records_read,
          dimensions_created,
          facts_loaded,
          rejected,
        };
        let record = ledger.finish(
          records_read,
          summary.rejected.len(),
          facts_loaded,
          RunOutcome::Committed,
          None,
        );
        if let Err(err) = self.store.record_run(record).await {
          warn!(run_id = %summary.run_id, error = %Into::<Error>::into(err), "failed to record run");
        }
        info!(
          run_id = %summary.run_id,
          records_read,
          facts_loaded,
          rejected = summary.rejected.len(),
          dimension_rows_created = summary.dimension_rows_created(),
          "pipeline run committed"
        );
        Ok(summary)
      }
      Err(err) => Err(self.abort(ledger, records_read, err).await),
    }
  }

  async fn transform_and_load(
    &self,
    run_id: Uuid,
    records: Vec<RawRecord>,
  ) -> Result<(BTreeMap<Dimension, usize>, u64, Vec<Rejection>)> {
    let total = records.len();
    let mut rejected = Vec::new();

    // ── Bin ───────────────────────────────────────────────────────────────
    let mut binned: Vec<BinnedRecord> = Vec::with_capacity(total);
    for record in records {
      let line = record.line;
      match record.bin() {
        Ok(b) => binned.push(b),
        Err(err) => rejected.push(Rejection::from_error(line, err)?),
      }
    }
    check_threshold(rejected.len(), total, self.max_rejected_fraction)?;

    // ── Resolve, assemble and load as one unit ────────────────────────────
    let binned_rejections = rejected.len();
    let max_fraction = self.max_rejected_fraction;
    let loaded = load_batch(self.store, binned, &self.retry, move |assembly: &Assembly| {
      check_threshold(binned_rejections + assembly.rejected.len(), total, max_fraction)
    })
    .await?;

    let mut created = loaded.committed.created;
    for dimension in Dimension::ALL {
      let n = *created.entry(dimension).or_insert(0);
      info!(%run_id, %dimension, created = n, "dimension resolved");
    }
    if loaded.attempts > 1 {
      info!(%run_id, attempts = loaded.attempts, "batch committed after write conflicts");
    }

    rejected.extend(loaded.committed.rejected);
    rejected.sort_by_key(|r| r.line);
    for r in &rejected {
      warn!(%run_id, line = r.line, reason = %r.reason, "record rejected");
    }

    Ok((created, loaded.committed.facts_loaded, rejected))
  }

  /// Record an aborted run and hand the error back.
  async fn abort(&self, ledger: Ledger, records_read: usize, err: Error) -> Error {
    warn!(run_id = %ledger.run_id, error = %err, "pipeline run aborted");
    let rejected = match &err {
      Error::RejectionThresholdExceeded { rejected, .. } => *rejected,
      _ => 0,
    };
    let record = ledger.finish(
      records_read,
      rejected,
      0,
      RunOutcome::Aborted,
      Some(err.to_string()),
    );
    if let Err(ledger_err) = self.store.record_run(record).await {
      warn!(error = %Into::<Error>::into(ledger_err), "failed to record aborted run");
    }
    err
  }
}

/// Fail once more than `max_fraction` of `total` records are rejected.
fn check_threshold(rejected: usize, total: usize, max_fraction: f64) -> Result<()> {
  if total == 0 || rejected == 0 {
    return Ok(());
  }
  if rejected as f64 / total as f64 > max_fraction {
    return Err(Error::RejectionThresholdExceeded { rejected, total, threshold: max_fraction });
  }
  Ok(())
}

// ─── Ledger entry under construction ─────────────────────────────────────────

struct Ledger {
  run_id:     Uuid,
  started_at: DateTime<Utc>,
  source:     String,
  sha256:     String,
}

impl Ledger {
  fn finish(
    self,
    records_read: usize,
    records_rejected: usize,
    facts_loaded: u64,
    outcome: RunOutcome,
    error: Option<String>,
  ) -> RunRecord {
    RunRecord {
      run_id: self.run_id,
      started_at: self.started_at,
      finished_at: Utc::now(),
      source: self.source,
      source_sha256: self.sha256,
      records_read: records_read as u64,
      records_rejected: records_rejected as u64,
      facts_loaded,
      outcome,
      error,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use inscost_core::{
    batch::{CommittedBatch, LoadBatch},
    fact::{FactRow, RejectionKind},
  };
  use inscost_store_sqlite::SqliteStore;

  use super::*;

  const HEADER: &str = "age,sex,bmi,children,smoker,region,charges\n";

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.expect("in-memory store")
  }

  fn config(max_rejected_fraction: f64) -> EtlConfig {
    EtlConfig {
      max_rejected_fraction,
      retry: RetryPolicy { max_attempts: 3, base_backoff_ms: 0 },
      ..Default::default()
    }
  }

  fn csv_file(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{HEADER}{body}").unwrap();
    file
  }

  fn sample_rows() -> &'static str {
    "19,female,27.9,0,yes,southwest,16884.924\n\
     18,male,33.77,1,no,southeast,1725.5523\n\
     28,male,33,3,no,southeast,4449.462\n\
     33,male,22.705,0,no,northwest,21984.47061\n\
     32,male,28.88,0,no,northwest,3866.8552\n\
     31,female,25.74,0,no,southeast,3756.6216\n\
     46,female,33.44,1,no,southeast,8240.5896\n\
     37,female,27.74,3,no,northwest,7281.5056\n\
     60,female,25.84,0,no,northwest,28923.13692\n\
     62,female,26.29,0,yes,southeast,27808.7251\n"
  }

  async fn dimension_sizes(s: &SqliteStore) -> BTreeMap<Dimension, usize> {
    let mut sizes = BTreeMap::new();
    for d in Dimension::ALL {
      sizes.insert(d, s.dimension_members(d).await.unwrap().len());
    }
    sizes
  }

  #[tokio::test]
  async fn single_record_against_empty_store() {
    let s = store().await;
    let file = csv_file("31,female,27.5,2,no,northeast,5432.10\n");

    let summary = Pipeline::new(&s, &config(0.0)).run(file.path()).await.unwrap();

    assert_eq!(summary.records_read, 1);
    assert_eq!(summary.facts_loaded, 1);
    assert!(summary.rejected.is_empty());
    assert!(summary.dimensions_created.values().all(|n| *n == 1));

    let expected: [(Dimension, &str); 5] = [
      (Dimension::Age, "26-35"),
      (Dimension::Sex, "female"),
      (Dimension::Smoker, "no"),
      (Dimension::Region, "northeast"),
      (Dimension::Children, "2"),
    ];
    for (dimension, key) in expected {
      assert_eq!(
        s.dimension_members(dimension).await.unwrap(),
        vec![(key.to_owned(), 1)],
        "{dimension}"
      );
    }

    let flat = s.flattened().await.unwrap();
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].bmi, 27.5);
    assert_eq!(flat[0].charges, 5432.10);
    assert_eq!(flat[0].children, 2);
  }

  #[tokio::test]
  async fn running_twice_is_idempotent_on_dimensions() {
    let s = store().await;
    let file = csv_file(sample_rows());
    let pipeline = Pipeline::new(&s, &config(0.0));

    let first = pipeline.run(file.path()).await.unwrap();
    let sizes_after_first = dimension_sizes(&s).await;
    let second = pipeline.run(file.path()).await.unwrap();

    assert_eq!(first.facts_loaded, 10);
    assert_eq!(second.facts_loaded, 10);
    assert_eq!(second.dimension_rows_created(), 0);
    assert_eq!(first.source_sha256, second.source_sha256);
    assert_eq!(dimension_sizes(&s).await, sizes_after_first);
    assert_eq!(sizes_after_first[&Dimension::Sex], 2);
    assert_eq!(sizes_after_first[&Dimension::Smoker], 2);
    assert_eq!(sizes_after_first[&Dimension::Region], 3);
    assert_eq!(sizes_after_first[&Dimension::Age], 4);
    assert_eq!(sizes_after_first[&Dimension::Children], 3);
    assert_eq!(s.fact_count().await.unwrap(), 20);

    let runs = s.runs(10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.outcome == RunOutcome::Committed));
  }

  #[tokio::test]
  async fn measures_are_carried_unchanged() {
    let s = store().await;
    let file = csv_file(sample_rows());
    Pipeline::new(&s, &config(0.0)).run(file.path()).await.unwrap();

    let records = inscost_csv::extract(file.path()).unwrap().records;
    let flat = s.flattened().await.unwrap();
    assert_eq!(flat.len(), records.len());
    for record in &records {
      assert_eq!(
        flat
          .iter()
          .filter(|row| row.bmi == record.bmi && row.charges == record.charges)
          .count(),
        1,
        "line {}",
        record.line
      );
    }
  }

  #[tokio::test]
  async fn out_of_range_age_is_rejected_and_reported() {
    let s = store().await;
    let file = csv_file(&format!("{}0,male,20.0,0,no,northwest,100.0\n", sample_rows()));

    let summary = Pipeline::new(&s, &config(0.5)).run(file.path()).await.unwrap();

    assert_eq!(summary.records_read, 11);
    assert_eq!(summary.facts_loaded, 10);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].line, 12);
    assert_eq!(summary.rejected[0].kind, RejectionKind::OutOfRangeValue);
  }

  #[tokio::test]
  async fn too_many_rejections_abort_before_any_write() {
    let s = store().await;
    let file = csv_file(
      "31,female,27.5,2,no,northeast,5432.10\n\
       0,male,20.0,0,no,northwest,100.0\n\
       101,male,20.0,0,no,northwest,100.0\n",
    );

    let err = Pipeline::new(&s, &config(0.5)).run(file.path()).await.unwrap_err();

    assert!(matches!(
      err,
      Error::RejectionThresholdExceeded { rejected: 2, total: 3, .. }
    ));
    assert_eq!(s.fact_count().await.unwrap(), 0);
    for d in Dimension::ALL {
      assert!(s.dimension_members(d).await.unwrap().is_empty());
    }

    let runs = s.runs(1).await.unwrap();
    assert_eq!(runs[0].outcome, RunOutcome::Aborted);
    assert_eq!(runs[0].records_rejected, 2);
  }

  #[tokio::test]
  async fn schema_error_aborts_without_writes() {
    let s = store().await;
    let file = csv_file("31,female,heavy,2,no,northeast,5432.10\n");

    let err = Pipeline::new(&s, &config(1.0)).run(file.path()).await.unwrap_err();

    assert!(matches!(err, Error::SchemaMismatch { line: 2, .. }));
    assert_eq!(s.fact_count().await.unwrap(), 0);
    assert!(s.dimension_members(Dimension::Sex).await.unwrap().is_empty());
    assert_eq!(s.runs(1).await.unwrap()[0].outcome, RunOutcome::Aborted);
  }

  #[tokio::test]
  async fn missing_source_is_source_unavailable() {
    let s = store().await;
    let err = Pipeline::new(&s, &config(0.0))
      .run(Path::new("/no/such/insurance.csv"))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable { .. }));

    let runs = s.runs(1).await.unwrap();
    assert_eq!(runs[0].outcome, RunOutcome::Aborted);
    assert!(runs[0].source_sha256.is_empty());
  }

  #[tokio::test]
  async fn empty_source_commits_an_empty_run() {
    let s = store().await;
    let file = csv_file("");

    let summary = Pipeline::new(&s, &config(0.0)).run(file.path()).await.unwrap();

    assert_eq!(summary.records_read, 0);
    assert_eq!(summary.facts_loaded, 0);
    assert_eq!(s.fact_count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn already_extracted_records_can_be_loaded() {
    let s = store().await;
    let records = inscost_csv::extract_reader(
      format!("{HEADER}45,male,30.1,1,yes,southwest,39611.76\n").as_bytes(),
    )
    .unwrap();

    let summary = Pipeline::new(&s, &config(0.0))
      .run_extracted("stdin", "", records)
      .await
      .unwrap();

    assert_eq!(summary.facts_loaded, 1);
    assert_eq!(s.runs(1).await.unwrap()[0].source, "stdin");
  }

  /// A store whose run transaction always fails after its dimension rows are
  /// inserted, as a lost connection during the fact load would.
  struct FailingLoad(SqliteStore);

  impl Warehouse for FailingLoad {
    type Error = inscost_store_sqlite::Error;

    async fn dimension_members(
      &self,
      d: Dimension,
    ) -> Result<Vec<(String, i64)>, Self::Error> {
      self.0.dimension_members(d).await
    }

    async fn insert_dimension_members(
      &self,
      d: Dimension,
      keys: Vec<String>,
    ) -> Result<Vec<(String, i64)>, Self::Error> {
      self.0.insert_dimension_members(d, keys).await
    }

    async fn load_facts(&self, _facts: Vec<FactRow>) -> Result<u64, Self::Error> {
      Err(Error::LoadFailure("connection lost".into()).into())
    }

    async fn commit_batch<F>(
      &self,
      batch: LoadBatch,
      accept: F,
    ) -> Result<CommittedBatch, Self::Error>
    where
      F: FnOnce(&Assembly) -> Result<()> + Send + 'static,
    {
      self
        .0
        .commit_batch(batch, move |assembly: &Assembly| {
          accept(assembly)?;
          Err(Error::LoadFailure("connection lost".into()))
        })
        .await
    }

    async fn record_run(&self, run: RunRecord) -> Result<(), Self::Error> {
      self.0.record_run(run).await
    }

    async fn runs(&self, limit: usize) -> Result<Vec<RunRecord>, Self::Error> {
      self.0.runs(limit).await
    }

    async fn fact_count(&self) -> Result<u64, Self::Error> { self.0.fact_count().await }

    async fn flattened(
      &self,
    ) -> Result<Vec<inscost_core::store::FlatRow>, Self::Error> {
      self.0.flattened().await
    }

    async fn average_charges(
      &self,
      d: Dimension,
    ) -> Result<Vec<inscost_core::store::ChargeAverage>, Self::Error> {
      self.0.average_charges(d).await
    }

    async fn regions(&self) -> Result<Vec<String>, Self::Error> { self.0.regions().await }
  }

  #[tokio::test]
  async fn load_failure_aborts_the_run_and_writes_nothing() {
    let s = FailingLoad(store().await);
    let file = csv_file(sample_rows());

    let err = Pipeline::new(&s, &config(0.0)).run(file.path()).await.unwrap_err();

    assert!(matches!(err, Error::LoadFailure(_)));
    assert_eq!(s.fact_count().await.unwrap(), 0);
    for d in Dimension::ALL {
      assert!(s.dimension_members(d).await.unwrap().is_empty(), "{d}");
    }
    assert_eq!(s.runs(1).await.unwrap()[0].outcome, RunOutcome::Aborted);

    let next = Pipeline::new(&s.0, &config(0.0)).run(file.path()).await.unwrap();
    assert_eq!(next.dimension_rows_created(), 14);
    assert_eq!(next.facts_loaded, 10);
  }

  #[tokio::test]
  async fn non_finite_charges_abort_before_any_write() {
    let s = store().await;
    let file = csv_file(
      "31,female,27.5,2,no,northeast,5432.10\n\
       40,male,30.0,0,no,southwest,NaN\n",
    );

    let err = Pipeline::new(&s, &config(0.5)).run(file.path()).await.unwrap_err();

    assert!(matches!(
      &err,
      Error::SchemaMismatch { line: 3, column: Some(c), .. } if c == "charges"
    ));
    assert_eq!(s.fact_count().await.unwrap(), 0);
    for d in Dimension::ALL {
      assert!(s.dimension_members(d).await.unwrap().is_empty(), "{d}");
    }
  }
}
