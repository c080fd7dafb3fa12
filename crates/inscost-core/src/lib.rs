//! Core types and trait definitions for the inscost star-schema pipeline.
//!
//! This crate is free of file-format and database dependencies.
//! The extractor, the SQLite backend and the pipeline binary all depend on it.

pub mod age;
pub mod batch;
pub mod correlation;
pub mod dimension;
pub mod error;
pub mod estimate;
pub mod fact;
pub mod record;
pub mod resolve;
pub mod run;
pub mod store;

pub use error::{Error, Result};

#[cfg(test)]
mod testing;
