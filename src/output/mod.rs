//! Output module for everything the harvester reports
//!
//! This module handles:
//! - The per-run error log (kept only when something went wrong)
//! - CSV export of the observation log
//! - Link-state statistics for the `status` command

mod error_log;
mod export;
mod stats;

pub use error_log::ErrorLog;
pub use export::{
    export_observations, export_row, render_csv, week_number, ExportSummary, EXPORT_HEADERS,
};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
