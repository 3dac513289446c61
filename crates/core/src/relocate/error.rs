//! Errors from moving and copying converted images.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while relocating a file.
#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("Nothing to relocate at {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Destination is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Could not create directory {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Copy {source} -> {destination} failed")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Move {source} -> {destination} failed")]
    MoveFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Source removal after a copy, or the delete post-success action.
    #[error("Could not remove {path}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelocateError {
    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source,
            destination,
            error,
        }
    }

    pub fn move_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::MoveFailed {
            source,
            destination,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_both_paths() {
        let err = RelocateError::move_failed(
            "/roms/Game.chd".into(),
            "/library/Game.chd".into(),
            std::io::Error::other("read-only"),
        );
        let text = err.to_string();
        assert!(text.contains("/roms/Game.chd"));
        assert!(text.contains("/library/Game.chd"));
    }
}
