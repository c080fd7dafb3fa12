//! Runtime configuration, layered from an optional TOML file and `INSCOST_*`
//! environment variables (environment wins).
//!
//! ```toml
//! store_path            = "~/data/inscost.db"
//! source_path           = "data/insurance.csv"
//! busy_timeout_ms       = 5000
//! max_rejected_fraction = 0.05
//!
//! [retry]
//! max_attempts    = 4
//! base_backoff_ms = 50
//! ```
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `INSCOST_RETRY__MAX_ATTEMPTS=8`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use inscost_core::resolve::RetryPolicy;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
  pub store_path:            PathBuf,
  /// Used by `inscost run` when no source argument is given.
  pub source_path:           Option<PathBuf>,
  pub busy_timeout_ms:       u64,
  /// Abort the run when more than this fraction of records is rejected.
  pub max_rejected_fraction: f64,
  pub retry:                 RetryPolicy,
}

impl Default for EtlConfig {
  fn default() -> Self {
    Self {
      store_path:            PathBuf::from("inscost.db"),
      source_path:           None,
      busy_timeout_ms:       5000,
      max_rejected_fraction: 0.05,
      retry:                 RetryPolicy::default(),
    }
  }
}

impl EtlConfig {
  /// Load from `file` (which may be absent) and the environment.
  pub fn load(file: &Path) -> Result<Self> {
    Self::load_with_env(file, "INSCOST")
  }

  pub(crate) fn load_with_env(file: &Path, env_prefix: &str) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(
        config::Environment::with_prefix(env_prefix)
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;

    let mut cfg: EtlConfig = settings.try_deserialize()?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    cfg.source_path = cfg.source_path.as_deref().map(expand_tilde);
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.max_rejected_fraction) {
      return Err(Error::InvalidSetting {
        key:    "max_rejected_fraction",
        reason: format!("{} is not within 0.0..=1.0", self.max_rejected_fraction),
      });
    }
    if self.retry.max_attempts == 0 {
      return Err(Error::InvalidSetting {
        key:    "retry.max_attempts",
        reason: "must be at least 1".into(),
      });
    }
    Ok(())
  }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
