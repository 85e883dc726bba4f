//! Category Registry
//!
//! The set of destination folders the model may choose from. It is published
//! once before workers start, frozen, and then read concurrently. Readers get
//! a cheap `Arc` snapshot so a single classification always validates against
//! one consistent list.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Category that always exists and receives anything unclassifiable
pub const FALLBACK_CATEGORY: &str = "Misc";

/// Maximum folder depth considered a category during discovery
pub const MAX_DISCOVERY_DEPTH: usize = 3;

/// Categories used before anything is discovered or configured
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Personal", "Work", "Finance", "Health", "Education", "Technical",
    "Travel", "Legal", "Projects", "Receipts", "Misc",
];

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Category registry is frozen; publish before starting workers")]
    Frozen,
    #[error("Category discovery failed in {path}: {reason}")]
    Discovery { path: PathBuf, reason: String },
}

/// Publish-once, read-many set of valid categories
#[derive(Debug)]
pub struct CategoryRegistry {
    current: RwLock<Arc<[String]>>,
    frozen: AtomicBool,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect())
    }
}

impl CategoryRegistry {
    pub fn new(categories: Vec<String>) -> Self {
        Self {
            current: RwLock::new(normalize(categories).into()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Replace the active set.
    ///
    /// An empty list is ignored and leaves the previous set in place, so a
    /// discovery that found nothing never erases a manual list. Returns
    /// whether the set was replaced.
    pub fn publish(&self, categories: Vec<String>) -> Result<bool, RegistryError> {
        if self.is_frozen() {
            return Err(RegistryError::Frozen);
        }
        if categories.is_empty() {
            debug!("Ignoring empty category list");
            return Ok(false);
        }

        let normalized = normalize(categories);
        info!(count = normalized.len(), "Published categories");
        *self.current.write() = normalized.into();
        Ok(true)
    }

    /// Stop accepting publishes. Called once workers are about to start.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Current set as a shared snapshot
    pub fn snapshot(&self) -> Arc<[String]> {
        Arc::clone(&self.current.read())
    }

    /// Exact, case-sensitive membership test
    pub fn is_member(&self, category: &str) -> bool {
        self.current.read().iter().any(|c| c == category)
    }

    pub fn fallback(&self) -> &'static str {
        FALLBACK_CATEGORY
    }
}

/// Dedup preserving first occurrence, drop blanks, guarantee the fallback entry
fn normalize(categories: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(categories.len() + 1);
    for category in categories {
        let category = category.trim().to_string();
        if !category.is_empty() && !out.contains(&category) {
            out.push(category);
        }
    }
    if !out.iter().any(|c| c == FALLBACK_CATEGORY) {
        out.push(FALLBACK_CATEGORY.to_string());
    }
    out
}

/// List destination subfolders as categories.
///
/// Folders up to three levels deep are returned as `/`-separated relative
/// paths in name order. Hidden folders and everything below them are skipped.
/// A destination that does not exist yet yields an empty list.
pub fn discover_categories(dest: &Path) -> Result<Vec<String>, RegistryError> {
    if !dest.exists() {
        debug!(path = %dest.display(), "Destination missing, nothing to discover");
        return Ok(Vec::new());
    }

    let walker = WalkDir::new(dest)
        .min_depth(1)
        .max_depth(MAX_DISCOVERY_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.file_name()));

    let mut categories = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| RegistryError::Discovery {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let relative = match entry.path().strip_prefix(dest) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let category = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        categories.push(category);
    }

    if !categories.iter().any(|c| c == FALLBACK_CATEGORY) {
        categories.push(FALLBACK_CATEGORY.to_string());
    }
    Ok(categories)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_contains_fallback() {
        let registry = CategoryRegistry::default();
        assert!(registry.is_member(FALLBACK_CATEGORY));
        assert_eq!(registry.snapshot().len(), DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn test_publish_replaces_and_adds_fallback() {
        let registry = CategoryRegistry::default();
        assert!(registry.publish(strings(&["Invoices", "Invoices", "Taxes"])).unwrap());

        let snapshot = registry.snapshot();
        assert_eq!(&*snapshot, &strings(&["Invoices", "Taxes", "Misc"])[..]);
        assert!(!registry.is_member("Personal"));
    }

    #[test]
    fn test_publish_empty_keeps_previous() {
        let registry = CategoryRegistry::new(strings(&["Manual"]));
        assert!(!registry.publish(Vec::new()).unwrap());
        assert!(registry.is_member("Manual"));
    }

    #[test]
    fn test_membership_is_case_sensitive() {
        let registry = CategoryRegistry::new(strings(&["Personal"]));
        assert!(registry.is_member("Personal"));
        assert!(!registry.is_member("personal"));
    }

    #[test]
    fn test_publish_after_freeze_fails() {
        let registry = CategoryRegistry::default();
        registry.freeze();
        assert!(matches!(registry.publish(strings(&["Late"])), Err(RegistryError::Frozen)));
        assert!(!registry.is_member("Late"));
    }

    #[test]
    fn test_snapshot_survives_publish() {
        let registry = CategoryRegistry::new(strings(&["Old"]));
        let before = registry.snapshot();
        registry.publish(strings(&["New"])).unwrap();
        assert!(before.iter().any(|c| c == "Old"));
        assert!(registry.snapshot().iter().any(|c| c == "New"));
    }

    #[test]
    fn test_discover_nested_folders() {
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(dest.path().join("Work/Projects")).unwrap();
        fs::create_dir_all(dest.path().join("Personal")).unwrap();

        let categories = discover_categories(dest.path()).unwrap();
        assert_eq!(categories, strings(&["Personal", "Work", "Work/Projects", "Misc"]));
    }

    #[test]
    fn test_discover_skips_hidden_and_deep() {
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(dest.path().join(".git/objects")).unwrap();
        fs::create_dir_all(dest.path().join("A/B/C/D")).unwrap();
        fs::create_dir_all(dest.path().join("Misc")).unwrap();
        fs::write(dest.path().join("A/readme.txt"), "not a category").unwrap();

        let categories = discover_categories(dest.path()).unwrap();
        assert_eq!(categories, strings(&["A", "A/B", "A/B/C", "Misc"]));
    }

    #[test]
    fn test_discover_missing_destination() {
        let dest = TempDir::new().unwrap();
        let categories = discover_categories(&dest.path().join("nope")).unwrap();
        assert!(categories.is_empty());
    }
}
