//! Upload file store.
//!
//! Stored names are timestamp-prefixed so the store is append-only per
//! filename: re-uploading `bill.jpg` never overwrites an earlier upload.
//! Removal is best-effort; a missing or locked file is logged and ignored.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file placed in the uploads directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Unique stored filename (`<millis>-<original>`).
    pub file_name: String,
    pub path: PathBuf,
    /// URL the gate serves the file under.
    pub file_url: String,
}

/// Copy a source file into the uploads directory under a unique name.
pub fn store_upload(uploads_dir: &Path, source_path: &Path) -> Result<StoredUpload, StoreError> {
    std::fs::create_dir_all(uploads_dir)?;

    let original = sanitize_filename(
        source_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload"),
    );
    let file_name = format!("{}-{}", chrono::Utc::now().timestamp_millis(), original);
    let path = uploads_dir.join(&file_name);
    std::fs::copy(source_path, &path)?;

    tracing::debug!(file = %file_name, "Upload stored");

    Ok(StoredUpload {
        file_url: format!("/uploads/{file_name}"),
        file_name,
        path,
    })
}

/// Strip path separators and NUL, cap the length, never return empty.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "upload".to_string()
    } else {
        clean
    }
}

/// Remove a stored upload. Best-effort: failures are logged, never surfaced.
pub fn remove_upload(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Stored upload removed"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Could not remove stored upload"
        ),
    }
}
