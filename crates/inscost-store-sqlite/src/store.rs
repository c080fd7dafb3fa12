//! [`SqliteStore`], the SQLite implementation of [`Warehouse`].

use std::{path::Path, time::Duration};

use rusqlite::{ErrorCode, ffi, types::Value};
use tracing::debug;

use inscost_core::{
  batch::{CommittedBatch, LoadBatch},
  dimension::{Dimension, SurrogateKey},
  fact::{Assembly, FactRow},
  run::RunRecord,
  store::{ChargeAverage, FlatRow, Warehouse},
};

use crate::{
  Error, Result,
  encode::{RawRun, dimension_table, encode_dt, encode_natural_key, encode_uuid},
  schema::SCHEMA,
};

/// Lock wait used by [`SqliteStore::open`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A star-schema store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. The
/// connection is closed when the last clone is dropped.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT).await
  }

  /// Like [`open`](Self::open) with an explicit lock wait. A writer that
  /// cannot get the database lock within `busy_timeout` fails with a store
  /// error instead of blocking indefinitely.
  pub async fn open_with_timeout(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  async fn init_schema(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Why a batch transaction was rolled back.
enum Rollback {
  Conflict { dimension: Dimension, value: String },
  Refused(inscost_core::Error),
  Load(String),
}

impl From<Rollback> for Error {
  fn from(r: Rollback) -> Self {
    let core = match r {
      Rollback::Conflict { dimension, value } => {
        inscost_core::Error::DimensionWriteConflict { dimension, value }
      }
      Rollback::Refused(err) => err,
      Rollback::Load(reason) => inscost_core::Error::LoadFailure(reason),
    };
    Error::Core(core)
  }
}

fn insert_facts(tx: &rusqlite::Transaction<'_>, facts: &[FactRow]) -> rusqlite::Result<u64> {
  let mut stmt = tx.prepare(
    "INSERT INTO fact_insurance (
       age_id, sex_id, bmi, children_id, smoker_id, region_id, charges
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
  )?;
  for f in facts {
    stmt.execute(rusqlite::params![
      f.age_id,
      f.sex_id,
      f.bmi,
      f.children_id,
      f.smoker_id,
      f.region_id,
      f.charges,
    ])?;
  }
  Ok(facts.len() as u64)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == ErrorCode::ConstraintViolation
        && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteStore {
  type Error = Error;

  // ── Dimensions ────────────────────────────────────────────────────────────

  async fn dimension_members(
    &self,
    dimension: Dimension,
  ) -> Result<Vec<(String, SurrogateKey)>> {
    let t = dimension_table(dimension);
    let sql = format!(
      "SELECT CAST({key} AS TEXT), {id} FROM {table} ORDER BY {id}",
      key = t.key_column,
      id = t.id_column,
      table = t.table,
    );

    let rows: Vec<(String, SurrogateKey)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(rows)
  }

  async fn insert_dimension_members(
    &self,
    dimension: Dimension,
    natural_keys: Vec<String>,
  ) -> Result<Vec<(String, SurrogateKey)>> {
    let t = dimension_table(dimension);
    let sql = format!(
      "INSERT INTO {table} ({key}) VALUES (?1)",
      table = t.table,
      key = t.key_column,
    );

    let bound: Vec<(String, Value)> = natural_keys
      .into_iter()
      .map(|k| encode_natural_key(dimension, &k).map(|v| (k, v)))
      .collect::<Result<_>>()?;

    // Inner `Err` carries the natural key that collided.
    let outcome: std::result::Result<Vec<(String, SurrogateKey)>, String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(bound.len());
        {
          let mut stmt = tx.prepare(&sql)?;
          for (key, value) in bound {
            match stmt.execute([value]) {
              Ok(_) => inserted.push((key, tx.last_insert_rowid())),
              // Dropping `tx` without commit rolls the batch back.
              Err(e) if is_unique_violation(&e) => return Ok(Err(key)),
              Err(e) => return Err(e.into()),
            }
          }
        }
        tx.commit()?;
        Ok(Ok(inserted))
      })
      .await?;

    match outcome {
      Ok(inserted) => {
        debug!(%dimension, created = inserted.len(), "dimension rows inserted");
        Ok(inserted)
      }
      Err(value) => {
        Err(inscost_core::Error::DimensionWriteConflict { dimension, value }.into())
      }
    }
  }

  // ── Facts ────────────────────────────────────────────────────────────────

  async fn load_facts(&self, facts: Vec<FactRow>) -> Result<u64> {
    let loaded = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let loaded = insert_facts(&tx, &facts)?;
        tx.commit()?;
        Ok(loaded)
      })
      .await
      .map_err(|e| inscost_core::Error::LoadFailure(e.to_string()))?;

    debug!(loaded, "fact batch committed");
    Ok(loaded)
  }

  // ── Run-scoped unit ───────────────────────────────────────────────────────

  async fn commit_batch<F>(&self, mut batch: LoadBatch, accept: F) -> Result<CommittedBatch>
  where
    F: FnOnce(&Assembly) -> inscost_core::Result<()> + Send + 'static,
  {
    let missing = std::mem::take(&mut batch.missing)
      .into_iter()
      .map(|(dimension, keys)| {
        let t = dimension_table(dimension);
        let sql = format!("INSERT INTO {} ({}) VALUES (?1)", t.table, t.key_column);
        let bound = keys
          .into_iter()
          .map(|k| encode_natural_key(dimension, &k).map(|v| (k, v)))
          .collect::<Result<Vec<(String, Value)>>>()?;
        Ok((dimension, sql, bound))
      })
      .collect::<Result<Vec<_>>>()?;

    let outcome: std::result::Result<CommittedBatch, Rollback> = self
      .conn
      .call(move |conn| {
        // Every early return drops `tx` uncommitted, rolling back the lot.
        let tx = conn.transaction()?;

        let mut inserted = Vec::with_capacity(missing.len());
        for (dimension, sql, bound) in missing {
          let mut stmt = tx.prepare(&sql)?;
          let mut rows = Vec::with_capacity(bound.len());
          for (key, value) in bound {
            match stmt.execute([value]) {
              Ok(_) => rows.push((key, tx.last_insert_rowid())),
              Err(e) if is_unique_violation(&e) => {
                return Ok(Err(Rollback::Conflict { dimension, value: key }));
              }
              Err(e) => return Err(e.into()),
            }
          }
          inserted.push((dimension, rows));
        }

        let assembly = batch.assemble(&inserted);
        if let Err(err) = accept(&assembly) {
          return Ok(Err(Rollback::Refused(err)));
        }

        let facts_loaded = match insert_facts(&tx, &assembly.facts) {
          Ok(n) => n,
          Err(e) => return Ok(Err(Rollback::Load(e.to_string()))),
        };
        if let Err(e) = tx.commit() {
          return Ok(Err(Rollback::Load(e.to_string())));
        }

        Ok(Ok(CommittedBatch {
          created: inserted.iter().map(|(d, rows)| (*d, rows.len())).collect(),
          rejected: assembly.rejected,
          facts_loaded,
        }))
      })
      .await?;

    let committed = outcome?;
    debug!(
      facts_loaded = committed.facts_loaded,
      dimension_rows = committed.created.values().sum::<usize>(),
      "run batch committed"
    );
    Ok(committed)
  }

  // ── Run ledger ────────────────────────────────────────────────────────────

  async fn record_run(&self, run: RunRecord) -> Result<()> {
    let run_id_str      = encode_uuid(run.run_id);
    let started_at_str  = encode_dt(run.started_at);
    let finished_at_str = encode_dt(run.finished_at);
    let outcome_str     = run.outcome.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO etl_runs (
             run_id, started_at, finished_at, source, source_sha256,
             records_read, records_rejected, facts_loaded, outcome, error
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            run_id_str,
            started_at_str,
            finished_at_str,
            run.source,
            run.source_sha256,
            run.records_read as i64,
            run.records_rejected as i64,
            run.facts_loaded as i64,
            outcome_str,
            run.error,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT run_id, started_at, finished_at, source, source_sha256,
                  records_read, records_rejected, facts_loaded, outcome, error
           FROM etl_runs
           ORDER BY started_at DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| {
            Ok(RawRun {
              run_id:           row.get(0)?,
              started_at:       row.get(1)?,
              finished_at:      row.get(2)?,
              source:           row.get(3)?,
              source_sha256:    row.get(4)?,
              records_read:     row.get(5)?,
              records_rejected: row.get(6)?,
              facts_loaded:     row.get(7)?,
              outcome:          row.get(8)?,
              error:            row.get(9)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRun::into_run).collect()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn fact_count(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM fact_insurance", [], |r| r.get(0))?)
      })
      .await?;
    Ok(count.max(0) as u64)
  }

  async fn flattened(&self) -> Result<Vec<FlatRow>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT age, sex, bmi, children, smoker, charges, region FROM insurance_flat",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(FlatRow {
              age:      row.get(0)?,
              sex:      row.get(1)?,
              bmi:      row.get(2)?,
              children: row.get(3)?,
              smoker:   row.get(4)?,
              charges:  row.get(5)?,
              region:   row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn average_charges(&self, dimension: Dimension) -> Result<Vec<ChargeAverage>> {
    let t = dimension_table(dimension);
    let sql = format!(
      "SELECT CAST(d.{key} AS TEXT), COUNT(*), AVG(f.charges)
       FROM fact_insurance f
       JOIN {table} d ON f.{id} = d.{id}
       GROUP BY d.{key}
       ORDER BY d.{key}",
      key = t.key_column,
      table = t.table,
      id = t.id_column,
    );

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            let facts: i64 = row.get(1)?;
            Ok(ChargeAverage {
              key:          row.get(0)?,
              facts:        facts.max(0) as u64,
              mean_charges: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn regions(&self) -> Result<Vec<String>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT region FROM dim_region ORDER BY region")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}
