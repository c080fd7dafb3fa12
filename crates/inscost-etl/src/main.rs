//! inscost command-line binary.
//!
//! Reads `inscost.toml` (or the path given with `--config`), opens the SQLite
//! warehouse, and runs one of the subcommands:
//!
//! ```text
//! inscost run data/insurance.csv        # load a CSV into the star schema
//! inscost report --by smoker            # mean charges per dimension member
//! inscost report --correlation          # bmi / children / charges correlation
//! inscost estimate --age 40 --sex male --bmi 31 --smoker --region southeast
//! inscost runs --limit 5                # recent entries of the run ledger
//! ```

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use inscost_core::{
  correlation::correlations,
  dimension::Dimension,
  estimate::{EstimateInput, check_region, estimate},
  store::Warehouse,
};
use inscost_etl::{EtlConfig, Pipeline, report};
use inscost_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Insurance charges star-schema ETL")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "inscost.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Extract a CSV source and load it into the warehouse.
  Run {
    /// CSV file to load; defaults to `source_path` from the config.
    source: Option<PathBuf>,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
  },

  /// Show fact counts and mean charges grouped by one dimension.
  Report {
    #[arg(long, default_value = "region")]
    by: Dimension,

    /// Show the bmi / children / charges correlation matrix instead.
    #[arg(long, conflicts_with = "by")]
    correlation: bool,
  },

  /// Estimate yearly charges with the fixed-coefficient formula.
  Estimate {
    #[arg(long)]
    age:      u32,
    #[arg(long)]
    sex:      String,
    #[arg(long)]
    bmi:      f64,
    #[arg(long, default_value_t = 0)]
    children: u32,
    #[arg(long)]
    smoker:   bool,
    #[arg(long)]
    region:   String,
  },

  /// List the most recent pipeline runs.
  Runs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = EtlConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let store = SqliteStore::open_with_timeout(&cfg.store_path, cfg.busy_timeout())
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Run { source, json } => {
      let Some(source) = source.or_else(|| cfg.source_path.clone()) else {
        bail!("no source given and no source_path configured");
      };
      let summary = Pipeline::new(&store, &cfg)
        .run(&source)
        .await
        .with_context(|| format!("pipeline run on {source:?} failed"))?;

      if json {
        println!("{}", report::summary_json(&summary)?);
      } else {
        print!("{}", report::summary_text(&summary));
      }
    }

    Command::Report { correlation: true, .. } => {
      let rows = store.flattened().await?;
      print!("{}", report::correlation_text(correlations(&rows).as_ref()));
    }

    Command::Report { by, .. } => {
      let rows = store.average_charges(by).await?;
      print!("{}", report::averages_text(by, &rows));
    }

    Command::Estimate { age, sex, bmi, children, smoker, region } => {
      let known = store.regions().await?;
      check_region(&known, &region)
        .with_context(|| format!("known regions: {}", known.join(", ")))?;
      let region = region.to_ascii_lowercase();

      let input = EstimateInput { age, sex, bmi, children, smoker, region };
      let est = estimate(&input)?;
      print!("{}", report::estimate_text(&input, &est));
    }

    Command::Runs { limit } => {
      let runs = store.runs(limit).await?;
      print!("{}", report::runs_text(&runs));
    }
  }

  Ok(())
}
