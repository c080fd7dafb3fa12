//! Pipeline run summaries and the run ledger.
//!
//! Every run, committed or aborted, leaves one [`RunRecord`] in the store's
//! ledger. The richer [`RunSummary`] is only returned to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dimension::Dimension, fact::Rejection};

// ─── Summary ─────────────────────────────────────────────────────────────────

/// What a successful run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_id:             Uuid,
  pub source:             String,
  pub source_sha256:      String,
  pub records_read:       usize,
  /// Dimension rows created by this run, per dimension.
  pub dimensions_created: BTreeMap<Dimension, usize>,
  pub facts_loaded:       u64,
  pub rejected:           Vec<Rejection>,
}

impl RunSummary {
  pub fn dimension_rows_created(&self) -> usize {
    self.dimensions_created.values().sum()
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
  Committed,
  Aborted,
}

impl RunOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Committed => "committed",
      Self::Aborted => "aborted",
    }
  }
}

/// One row of the run ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
  pub run_id:           Uuid,
  pub started_at:       DateTime<Utc>,
  pub finished_at:      DateTime<Utc>,
  pub source:           String,
  /// Empty when the source could not be read.
  pub source_sha256:    String,
  pub records_read:     u64,
  pub records_rejected: u64,
  pub facts_loaded:     u64,
  pub outcome:          RunOutcome,
  /// Error text for aborted runs.
  pub error:            Option<String>,
}
