//! Error types for the archive module.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Not a recognised archive: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// The archive needs 7-Zip and no binary is configured.
    #[error("7-Zip is required to extract {path} but is not configured")]
    ToolNotConfigured { path: PathBuf },

    #[error("7-Zip not found at path: {path}")]
    ToolNotFound { path: PathBuf },

    #[error("Extraction of {path} failed: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("Extraction timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Invalid zip archive: {0}")]
    Zip(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn extraction_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
