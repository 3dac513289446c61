//! Error types for discovery.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a discovery pass as a whole.
///
/// Problems with individual files never surface here; they are logged and
/// counted in the report.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Source directory not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Source path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Discovery task failed: {0}")]
    TaskFailed(String),
}
