//! Processing pipeline
//!
//! Scanner, bounded worker pool, cancellation and run accounting.

pub mod orchestrator;
pub mod progress;
pub mod scanner;
pub mod shutdown;
pub mod worker;

use std::path::PathBuf;
use thiserror::Error;

pub use orchestrator::{Pipeline, PipelineConfig, DEFAULT_FILE_TIMEOUT, DEFAULT_WORKERS};
pub use progress::{ProgressCounters, ProgressSnapshot, RunSummary};
pub use scanner::Job;
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use worker::FileOutcome;

/// Run-level failures. Everything file-scoped ends up in the counters instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source directory does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("Cannot create destination directory {path}: {source}")]
    Destination { path: PathBuf, #[source] source: std::io::Error },
    #[error("Failed to scan {path}: {reason}")]
    Scan { path: PathBuf, reason: String },
}
