//! Per-file processing
//!
//! Each job is a supervised unit: it runs under its own timeout, and a panic
//! anywhere inside it is caught at this boundary and recorded as a failure.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::progress::ProgressCounters;
use super::scanner::Job;
use super::shutdown::ShutdownSignal;
use crate::categorize::{sanitize_filename, CategorizationEngine};
use crate::extract::extract_text;
use crate::fileops::move_file;

/// State shared by every worker in a run
pub(crate) struct WorkerContext {
    pub engine: Arc<CategorizationEngine>,
    pub dest: PathBuf,
    pub extract_limit: usize,
    pub file_timeout: Duration,
    pub counters: Arc<ProgressCounters>,
}

/// How a single file ended
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Relocated. `fallback` is set when classification failed and the file
    /// went to the fallback folder under its original name.
    Moved { dest: PathBuf, fallback: bool },
    Failed { reason: String },
    /// Interrupted by run cancellation; counted neither way
    Cancelled,
}

pub(crate) async fn run_worker(
    worker_idx: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    ctx: Arc<WorkerContext>,
    shutdown: ShutdownSignal,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = receive_job(&receiver) => match job {
                Some(job) => job,
                None => break,
            },
        };

        let outcome = supervise(&ctx, &job.path, &shutdown).await;
        record(&ctx.counters, &job.path, &outcome);
    }
    debug!(worker = worker_idx, "Worker stopped");
}

async fn receive_job(receiver: &Arc<Mutex<mpsc::Receiver<Job>>>) -> Option<Job> {
    let mut guard = receiver.lock().await;
    guard.recv().await
}

/// Run one file under its timeout and panic guard.
///
/// Extraction and classification are timed; the move that follows is not, so
/// a file is either fully relocated or left where it was.
pub(crate) async fn supervise(ctx: &WorkerContext, path: &Path, shutdown: &ShutdownSignal) -> FileOutcome {
    let work = AssertUnwindSafe(classify_file(ctx, path, shutdown)).catch_unwind();

    let placement = match tokio::time::timeout(ctx.file_timeout, work).await {
        Ok(Ok(Ok(placement))) => placement,
        Ok(Ok(Err(outcome))) => return outcome,
        Ok(Err(panic)) => {
            let reason = panic_message(panic.as_ref());
            error!(path = %path.display(), panic = %reason, "Worker panicked while processing file");
            return FileOutcome::Failed { reason: format!("panic: {}", reason) };
        }
        Err(_) => {
            warn!(path = %path.display(), timeout_secs = ctx.file_timeout.as_secs(), "File timed out");
            return FileOutcome::Failed { reason: "timed out".to_string() };
        }
    };

    if shutdown.is_cancelled() {
        return FileOutcome::Cancelled;
    }
    relocate(&ctx.dest, path, placement).await
}

/// Where a classified file should go
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    folder: String,
    name: String,
    fallback: bool,
}

/// Extract and classify. `Err` carries an outcome that ends the file early.
async fn classify_file(ctx: &WorkerContext, path: &Path, shutdown: &ShutdownSignal) -> Result<Placement, FileOutcome> {
    if shutdown.is_cancelled() {
        return Err(FileOutcome::Cancelled);
    }
    info!(file = %display_name(path), "Processing file");

    let text = match extract_text(path, ctx.extract_limit).await {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to extract text");
            return Err(FileOutcome::Failed { reason: e.to_string() });
        }
    };

    if shutdown.is_cancelled() {
        return Err(FileOutcome::Cancelled);
    }

    let categorized = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Err(FileOutcome::Cancelled),
        result = ctx.engine.categorize(&text) => result,
    };

    Ok(match categorized {
        Ok(result) => Placement {
            folder: result.category,
            name: format!("{}{}", result.title, dotted_extension(path)),
            fallback: false,
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Categorization failed, using fallback folder");
            Placement {
                folder: e.fallback().category.clone(),
                name: sanitize_filename(&display_name(path)),
                fallback: true,
            }
        }
    })
}

/// Move the file on the blocking pool; hashing and cross-device copies never
/// hold a runtime thread
async fn relocate(dest: &Path, path: &Path, placement: Placement) -> FileOutcome {
    let Placement { folder, name, fallback } = placement;
    let src = path.to_path_buf();
    let dest_folder = category_dir(dest, &folder);
    let target_name = name.clone();

    match tokio::task::spawn_blocking(move || move_file(&src, &dest_folder, &target_name)).await {
        Ok(Ok(dest)) => FileOutcome::Moved { dest, fallback },
        Ok(Err(e)) => {
            error!(path = %path.display(), folder = %folder, name = %name, error = %e, "Failed to move file");
            FileOutcome::Failed { reason: e.to_string() }
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Move task did not complete");
            FileOutcome::Failed { reason: format!("move task failed: {}", e) }
        }
    }
}

fn record(counters: &ProgressCounters, path: &Path, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Moved { dest, fallback } => {
            counters.add_processed();
            info!(from = %display_name(path), to = %dest.display(), fallback, "File organized");
        }
        FileOutcome::Failed { .. } => counters.add_failed(),
        FileOutcome::Cancelled => {
            counters.add_cancelled();
            debug!(path = %path.display(), "File skipped by cancellation");
            return;
        }
    }
    counters.report();
}

/// `dest` joined with each `/`-separated category segment
fn category_dir(dest: &Path, category: &str) -> PathBuf {
    category
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(dest.to_path_buf(), |dir, segment| dir.join(segment))
}

/// Extension with its dot, original case preserved; empty when absent
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextManager, Tokenizer};
    use crate::llm::{ChatBackend, ChatRequest, LlmError};
    use crate::pipeline::shutdown::shutdown_channel;
    use crate::registry::CategoryRegistry;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    /// Always files documents under Personal
    struct DiaryBackend;

    #[async_trait]
    impl ChatBackend for DiaryBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            Ok(r#"{"category": "Personal", "title": "My Diary", "confidence_score": 0.9}"#.to_string())
        }
    }

    fn context(dest: &Path) -> WorkerContext {
        let tokenizer = Arc::new(Tokenizer::for_encoding("cl100k_base").unwrap());
        WorkerContext {
            engine: Arc::new(CategorizationEngine::new(
                Arc::new(DiaryBackend),
                ContextManager::new(tokenizer, 4096),
                Arc::new(CategoryRegistry::default()),
                "test-model",
            )),
            dest: dest.to_path_buf(),
            extract_limit: 1000,
            file_timeout: Duration::from_secs(5),
            counters: Arc::new(ProgressCounters::new()),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_supervise_moves_on_blocking_pool() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let path = src.path().join("entry.txt");
        fs::write(&path, "dear diary").unwrap();

        // A sibling timer keeps ticking on the single runtime thread
        let ticker = tokio::spawn(async {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
        let outcome = supervise(&context(dest.path()), &path, &ShutdownSignal::never()).await;
        ticker.await.unwrap();

        let expected = dest.path().join("Personal/My Diary.txt");
        assert_eq!(outcome, FileOutcome::Moved { dest: expected.clone(), fallback: false });
        assert_eq!(fs::read_to_string(expected).unwrap(), "dear diary");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_relocate_failure_keeps_source() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let path = src.path().join("entry.txt");
        fs::write(&path, "dear diary").unwrap();
        // A plain file where the category folder should be
        fs::write(dest.path().join("Personal"), "").unwrap();

        let placement = Placement { folder: "Personal".to_string(), name: "My Diary.txt".to_string(), fallback: false };
        let outcome = relocate(dest.path(), &path, placement).await;

        assert!(matches!(outcome, FileOutcome::Failed { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "dear diary");
    }

    #[tokio::test]
    async fn test_cancelled_before_move() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let path = src.path().join("entry.txt");
        fs::write(&path, "dear diary").unwrap();

        let (handle, signal) = shutdown_channel();
        handle.trigger();
        let outcome = supervise(&context(dest.path()), &path, &signal).await;

        assert_eq!(outcome, FileOutcome::Cancelled);
        assert!(path.exists());
    }

    #[test]
    fn test_category_dir() {
        let dest = Path::new("/sorted");
        assert_eq!(category_dir(dest, "Work/Projects"), PathBuf::from("/sorted/Work/Projects"));
        assert_eq!(category_dir(dest, "Misc"), PathBuf::from("/sorted/Misc"));
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("a/Report.PDF")), ".PDF");
        assert_eq!(dotted_extension(Path::new("notes")), "");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
