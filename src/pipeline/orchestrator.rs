//! Pipeline Orchestrator
//!
//! Publishes categories, starts a fixed pool of workers draining a bounded
//! queue, and feeds the queue from the scanner until the source tree is
//! exhausted or the run is cancelled.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::progress::{ProgressCounters, RunSummary};
use super::scanner::{scan, Job};
use super::shutdown::ShutdownSignal;
use super::worker::{run_worker, WorkerContext};
use super::PipelineError;
use crate::categorize::CategorizationEngine;
use crate::extract::DEFAULT_EXTRACT_LIMIT;
use crate::registry::discover_categories;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Queue slots per worker
const QUEUE_SLOTS_PER_WORKER: usize = 2;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub workers: usize,
    pub extract_limit: usize,
    pub file_timeout: Duration,
    /// When non-empty, published instead of discovering categories
    pub manual_categories: Vec<String>,
}

impl PipelineConfig {
    pub fn new(src: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            workers: DEFAULT_WORKERS,
            extract_limit: DEFAULT_EXTRACT_LIMIT,
            file_timeout: DEFAULT_FILE_TIMEOUT,
            manual_categories: Vec::new(),
        }
    }

    fn queue_capacity(&self) -> usize {
        self.workers.max(1) * QUEUE_SLOTS_PER_WORKER
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<CategorizationEngine>,
    counters: Arc<ProgressCounters>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engine: Arc<CategorizationEngine>) -> Self {
        Self {
            config,
            engine,
            counters: Arc::new(ProgressCounters::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn counters(&self) -> &Arc<ProgressCounters> {
        &self.counters
    }

    /// Process the whole source tree.
    ///
    /// Only an unusable source directory or an uncreatable destination fails
    /// the run. Cancellation ends it early with a partial summary.
    pub async fn run(&self, shutdown: ShutdownSignal) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        if !self.config.src.is_dir() {
            return Err(PipelineError::SourceMissing(self.config.src.clone()));
        }

        self.publish_categories();
        // Created after discovery so an empty new folder does not replace the defaults
        std::fs::create_dir_all(&self.config.dest).map_err(|source| PipelineError::Destination {
            path: self.config.dest.clone(),
            source,
        })?;

        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(self.config.queue_capacity());
        let receiver = Arc::new(Mutex::new(rx));
        let ctx = Arc::new(WorkerContext {
            engine: Arc::clone(&self.engine),
            dest: self.config.dest.clone(),
            extract_limit: self.config.extract_limit,
            file_timeout: self.config.file_timeout,
            counters: Arc::clone(&self.counters),
        });

        let mut join_set = JoinSet::new();
        for worker_idx in 0..workers {
            join_set.spawn(run_worker(
                worker_idx,
                Arc::clone(&receiver),
                Arc::clone(&ctx),
                shutdown.clone(),
            ));
        }
        // Workers own the receiver now; if they all exit the scanner's sends fail
        drop(receiver);
        info!(workers, queue = self.config.queue_capacity(), "Workers started");

        let skip = nested_destination(&self.config.src, &self.config.dest);
        let scanned = scan(&self.config.src, skip.as_deref(), tx, &self.counters, &shutdown).await;

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        scanned?;
        let summary = RunSummary::new(self.counters.snapshot(), started_at, Utc::now());
        if shutdown.is_cancelled() {
            warn!("Run cancelled; summary is partial");
        }
        info!(
            total = summary.total,
            processed = summary.processed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Run finished"
        );
        Ok(summary)
    }

    /// Publish manual or discovered categories, then freeze the registry
    fn publish_categories(&self) {
        let registry = self.engine.registry();

        let categories = if !self.config.manual_categories.is_empty() {
            info!(count = self.config.manual_categories.len(), "Using manual categories");
            self.config.manual_categories.clone()
        } else {
            match discover_categories(&self.config.dest) {
                Ok(found) => {
                    info!(count = found.len(), dest = %self.config.dest.display(), "Discovered categories");
                    found
                }
                Err(e) => {
                    warn!(error = %e, "Category discovery failed, keeping configured categories");
                    Vec::new()
                }
            }
        };

        if let Err(e) = registry.publish(categories) {
            warn!(error = %e, "Categories not published");
        }
        registry.freeze();
    }
}

/// The destination, if it sits inside the source tree, spelled the way the
/// scanner will see it (relative to `src` as given)
fn nested_destination(src: &Path, dest: &Path) -> Option<PathBuf> {
    let canonical_src = src.canonicalize().ok()?;
    let canonical_dest = dest.canonicalize().ok()?;
    match canonical_dest.strip_prefix(&canonical_src) {
        Ok(rel) if !rel.as_os_str().is_empty() => Some(src.join(rel)),
        _ => None,
    }
}
