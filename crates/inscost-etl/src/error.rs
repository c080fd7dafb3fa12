//! Error types for configuration loading.
//!
//! Pipeline failures use [`inscost_core::Error`] directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("invalid setting {key}: {reason}")]
  InvalidSetting { key: &'static str, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
