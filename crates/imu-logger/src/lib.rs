//! IMU Logger
//!
//! Polls a camera's sensors from one background thread, drops duplicate
//! and out-of-order samples per sensor kind, and appends the accepted
//! samples to CSV-like log files.

mod filter;
mod logger;
mod record;

pub use filter::{SensorFilters, TimestampFilter};
pub use logger::{log_paths, LoggerConfig, LoggerHandle, LoggerPhase, LoggerReport, SensorLogger};
pub use record::{format_record, LogWriter};

use std::path::PathBuf;
use thiserror::Error;

/// Logger error types
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Failed to open log file {path}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn logger thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Logger thread panicked")]
    Panicked,
}
