pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::LocalStorage;
pub use core::pipeline::{RunOutcome, RunRequest, StatementPipeline};
pub use utils::error::{Result, StatementError};
