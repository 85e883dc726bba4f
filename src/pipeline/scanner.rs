//! Source tree scanner
//!
//! Streams supported files into the bounded job queue. A full queue blocks
//! the scanner until a worker frees a slot or the run is cancelled.

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::progress::ProgressCounters;
use super::shutdown::ShutdownSignal;
use super::PipelineError;
use crate::extract::is_supported;

/// A file waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub path: PathBuf,
}

/// Walk `src` and enqueue every supported file. Returns the number enqueued.
///
/// Files under `skip` (the destination, when it lives inside the source) are
/// never picked up. Unreadable entries are logged and skipped; only an
/// unreadable source root is fatal.
pub async fn scan(
    src: &Path,
    skip: Option<&Path>,
    jobs: mpsc::Sender<Job>,
    counters: &ProgressCounters,
    shutdown: &ShutdownSignal,
) -> Result<usize, PipelineError> {
    let walker = WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| skip.map_or(true, |dir| e.path() != dir));

    let mut enqueued = 0;
    for entry in walker {
        if shutdown.is_cancelled() {
            debug!("Scan cancelled");
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(PipelineError::Scan { path: src.to_path_buf(), reason: e.to_string() });
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_supported(entry.path()) {
            continue;
        }

        counters.add_total();
        let job = Job { path: entry.into_path() };
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Scan cancelled while queue was full");
                break;
            }
            sent = jobs.send(job) => {
                if sent.is_err() {
                    // Every worker is gone
                    break;
                }
                enqueued += 1;
            }
        }
    }

    info!(enqueued, "Scan finished");
    Ok(enqueued)
}
