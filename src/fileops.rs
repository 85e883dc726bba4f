//! File relocation with collision handling
//!
//! The destination name is reserved with `create_new` before anything is
//! moved, so two workers resolving to the same name can never overwrite each
//! other. A taken name gets an 8-character content hash suffix.

use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Hex characters of the content hash used to disambiguate names
pub const HASH_SUFFIX_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum MoveError {
    #[error("failed to create destination directory {path}: {source}")]
    CreateDir { path: PathBuf, #[source] source: io::Error },
    #[error("failed to hash {path} for collision resolution: {source}")]
    Hash { path: PathBuf, #[source] source: io::Error },
    #[error("failed to reserve {path}: {source}")]
    Reserve { path: PathBuf, #[source] source: io::Error },
    #[error("destination already exists even with hash suffix: {path}")]
    Collision { path: PathBuf },
    #[error("failed to copy file (fallback) to {path}: {source}")]
    Copy { path: PathBuf, #[source] source: io::Error },
    #[error("failed to remove source {path} after copy: {source}")]
    RemoveSource { path: PathBuf, #[source] source: io::Error },
}

/// Move `src` to `dest_folder/desired_name`, returning the final path.
///
/// `desired_name` may contain `/`-separated subfolders; they are created.
/// Rename is tried first, then copy-and-delete for cross-device moves.
pub fn move_file(src: &Path, dest_folder: &Path, desired_name: &str) -> Result<PathBuf, MoveError> {
    let target = dest_folder.join(desired_name);
    let parent = target.parent().unwrap_or(dest_folder).to_path_buf();
    fs::create_dir_all(&parent).map_err(|source| MoveError::CreateDir { path: parent.clone(), source })?;

    let reserved = match reserve(&target)? {
        Some(path) => path,
        None => {
            let hash = content_hash(src).map_err(|source| MoveError::Hash { path: src.to_path_buf(), source })?;
            let alternate = parent.join(suffixed_name(&target, &hash[..HASH_SUFFIX_LEN]));
            debug!(taken = %target.display(), alternate = %alternate.display(), "Name collision");
            reserve(&alternate)?.ok_or(MoveError::Collision { path: alternate })?
        }
    };

    if fs::rename(src, &reserved).is_ok() {
        info!(from = %src.display(), to = %reserved.display(), "Moved file");
        return Ok(reserved);
    }

    // Likely a cross-device move; copy into the reserved slot instead
    copy_then_remove(src, &reserved, |path| fs::remove_file(path))?;
    info!(from = %src.display(), to = %reserved.display(), "Copied file across devices");
    Ok(reserved)
}

/// Copy `src` into the already reserved slot, then delete `src` with `remove`.
///
/// On any failure the slot is released and `src` is left in place.
fn copy_then_remove<F>(src: &Path, reserved: &Path, remove: F) -> Result<(), MoveError>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    if let Err(source) = fs::copy(src, reserved) {
        let _ = fs::remove_file(reserved);
        return Err(MoveError::Copy { path: reserved.to_path_buf(), source });
    }
    if let Err(source) = remove(src) {
        let _ = fs::remove_file(reserved);
        return Err(MoveError::RemoveSource { path: src.to_path_buf(), source });
    }
    Ok(())
}

/// Atomically claim `path`. `None` means the name is taken.
fn reserve(path: &Path) -> Result<Option<PathBuf>, MoveError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(Some(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(source) => Err(MoveError::Reserve { path: path.to_path_buf(), source }),
    }
}

/// `report.pdf` + `1a2b3c4d` -> `report_1a2b3c4d.pdf`
fn suffixed_name(target: &Path, suffix: &str) -> String {
    let stem = target.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    match target.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    }
}

/// Hex SHA-256 of a file's contents
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
