//! Plain-text and JSON rendering of pipeline results for the CLI.

use std::fmt::Write as _;

use inscost_core::{
  correlation::{COLUMNS, Correlations},
  dimension::Dimension,
  estimate::{Estimate, EstimateInput},
  run::{RunRecord, RunSummary},
  store::ChargeAverage,
};

// ─── Run summary ─────────────────────────────────────────────────────────────

pub fn summary_text(summary: &RunSummary) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "run {}", summary.run_id);
  let _ = writeln!(out, "  source         {}", summary.source);
  let _ = writeln!(out, "  sha256         {}", summary.source_sha256);
  let _ = writeln!(out, "  records read   {}", summary.records_read);
  let _ = writeln!(out, "  facts loaded   {}", summary.facts_loaded);
  let _ = writeln!(out, "  rejected       {}", summary.rejected.len());
  let _ = writeln!(out, "  dimension rows created:");
  for dimension in Dimension::ALL {
    let created = summary.dimensions_created.get(&dimension).copied().unwrap_or(0);
    let _ = writeln!(out, "    {:<10} {created}", dimension.name());
  }
  for r in &summary.rejected {
    let _ = writeln!(out, "  line {}: {}", r.line, r.reason);
  }
  out
}

pub fn summary_json(summary: &RunSummary) -> serde_json::Result<String> {
  serde_json::to_string_pretty(summary)
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

pub fn averages_text(dimension: Dimension, rows: &[ChargeAverage]) -> String {
  if rows.is_empty() {
    return "no facts loaded\n".to_owned();
  }

  let width = rows
    .iter()
    .map(|r| r.key.len())
    .chain([dimension.name().len()])
    .max()
    .unwrap_or(0);

  let mut out = String::new();
  let _ = writeln!(out, "{:<width$}  {:>7}  {:>12}", dimension.name(), "facts", "mean");
  for r in rows {
    let _ = writeln!(out, "{:<width$}  {:>7}  {:>12.2}", r.key, r.facts, r.mean_charges);
  }
  out
}

pub fn correlation_text(correlations: Option<&Correlations>) -> String {
  let Some(c) = correlations else {
    return "not enough facts to correlate\n".to_owned();
  };

  let mut out = String::new();
  let _ = write!(out, "{:<8}", "");
  for name in COLUMNS {
    let _ = write!(out, "  {name:>8}");
  }
  let _ = writeln!(out);
  for (name, cells) in COLUMNS.iter().zip(&c.matrix) {
    let _ = write!(out, "{name:<8}");
    for cell in cells {
      match cell {
        Some(r) => {
          let _ = write!(out, "  {r:>8.3}");
        }
        None => {
          let _ = write!(out, "  {:>8}", "-");
        }
      }
    }
    let _ = writeln!(out);
  }
  let _ = writeln!(out, "({} facts)", c.rows);
  out
}

// ─── Run ledger ──────────────────────────────────────────────────────────────

pub fn runs_text(runs: &[RunRecord]) -> String {
  if runs.is_empty() {
    return "no runs recorded\n".to_owned();
  }

  let mut out = String::new();
  for run in runs {
    let _ = writeln!(
      out,
      "{}  {:<9}  read {:>5}  loaded {:>5}  rejected {:>4}  {}",
      run.started_at.format("%Y-%m-%d %H:%M:%S"),
      run.outcome.as_str(),
      run.records_read,
      run.facts_loaded,
      run.records_rejected,
      run.source,
    );
    if let Some(error) = &run.error {
      let _ = writeln!(out, "    {error}");
    }
  }
  out
}

// ─── Estimate ────────────────────────────────────────────────────────────────

pub fn estimate_text(input: &EstimateInput, estimate: &Estimate) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "estimated charges: {:.2}", estimate.charges);
  if let Some(quit) = estimate.if_quit_smoking {
    let _ = writeln!(
      out,
      "without smoking:   {quit:.2} (saves {:.2})",
      estimate.smoking_surcharge()
    );
  }
  let _ = writeln!(
    out,
    "for age {}, {}, bmi {:.1}, {} children, {}",
    input.age, input.sex, input.bmi, input.children, input.region
  );
  out
}
