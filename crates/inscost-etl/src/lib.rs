//! Pipeline orchestration and CLI support for inscost.
//!
//! [`Pipeline`] drives extract → transform → load against any
//! [`Warehouse`](inscost_core::store::Warehouse); [`EtlConfig`] supplies its
//! settings and [`report`] renders results for the terminal.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::EtlConfig;
pub use error::Error;
pub use pipeline::Pipeline;
