//! Run counters and the final summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Counters shared by the scanner and all workers. Only ever incremented.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    total: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ProgressSnapshot {
    pub fn completed(&self) -> usize {
        self.processed + self.failed
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed() as f64 / self.total as f64 * 100.0
        }
    }
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Log the current progress line
    pub fn report(&self) {
        let s = self.snapshot();
        info!(
            completed = s.completed(),
            total = s.total,
            processed = s.processed,
            failed = s.failed,
            percent = format!("{:.1}", s.percent()),
            "Progress"
        );
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(counters: ProgressSnapshot, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            total: counters.total,
            processed: counters.processed,
            failed: counters.failed,
            cancelled: counters.cancelled,
            started_at,
            finished_at,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        writeln!(f, "- Total Files:        {}", self.total)?;
        writeln!(f, "- Successfully Moved: {}", self.processed)?;
        writeln!(f, "- Failed/Skipped:     {}", self.failed)?;
        if self.cancelled > 0 {
            writeln!(f, "- Cancelled:          {}", self.cancelled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_concurrent_increments() {
        let counters = Arc::new(ProgressCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.add_total();
                        counters.add_processed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total, 8000);
        assert_eq!(snapshot.processed, 8000);
        assert_eq!(snapshot.failed, 0);
    }

    #[test]
    fn test_percent() {
        let empty = ProgressSnapshot { total: 0, processed: 0, failed: 0, cancelled: 0 };
        assert_eq!(empty.percent(), 0.0);

        let half = ProgressSnapshot { total: 4, processed: 1, failed: 1, cancelled: 0 };
        assert_eq!(half.completed(), 2);
        assert!((half.percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_display() {
        let now = Utc::now();
        let snapshot = ProgressSnapshot { total: 3, processed: 2, failed: 1, cancelled: 0 };
        let text = RunSummary::new(snapshot, now, now).to_string();

        assert!(text.starts_with("\nSummary:\n"));
        assert!(text.contains("- Total Files:        3\n"));
        assert!(text.contains("- Successfully Moved: 2\n"));
        assert!(text.contains("- Failed/Skipped:     1\n"));
        assert!(!text.contains("Cancelled"));
    }
}
