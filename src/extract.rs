//! Text extraction for supported document types
//!
//! PDFs go through `pdf_extract` on a blocking thread. Everything else
//! recognized is read as UTF-8 text, lossily.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Extensions the pipeline picks up, lowercase and without the dot
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Default maximum characters extracted per file
pub const DEFAULT_EXTRACT_LIMIT: usize = 100_000;

/// Worst-case UTF-8 width, used to bound plain text reads
const MAX_UTF8_BYTES: usize = 4;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed for {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },
    #[error("Unsupported file type: {0}")]
    Unsupported(PathBuf),
}

/// Lowercased extension of `path`, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether the pipeline should process this file
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Extract at most `max_chars` characters of text from `path`
pub async fn extract_text(path: &Path, max_chars: usize) -> Result<String, ExtractError> {
    let text = match extension_of(path).as_deref() {
        Some("pdf") => extract_pdf(path).await?,
        Some("txt") | Some("md") => extract_plain(path, max_chars).await?,
        _ => return Err(ExtractError::Unsupported(path.to_path_buf())),
    };

    let text = truncate_chars(text, max_chars);
    debug!(path = %path.display(), chars = text.chars().count(), "Extracted text");
    Ok(text)
}

async fn extract_plain(path: &Path, max_chars: usize) -> Result<String, ExtractError> {
    let io_err = |source| ExtractError::Io { path: path.to_path_buf(), source };

    let file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut buf = Vec::new();
    file.take((max_chars.saturating_mul(MAX_UTF8_BYTES)) as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(io_err)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let owned = path.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || {
        // The parser can panic on malformed fonts
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
    })
    .await;

    match joined {
        Ok(Ok(Ok(text))) => Ok(text),
        Ok(Ok(Err(e))) => Err(ExtractError::Pdf { path: owned, reason: e.to_string() }),
        Ok(Err(_)) => {
            warn!(path = %owned.display(), "PDF parser panicked");
            Err(ExtractError::Pdf { path: owned, reason: "parser panicked".to_string() })
        }
        Err(e) => Err(ExtractError::Pdf { path: owned, reason: e.to_string() }),
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text,
    }
}
