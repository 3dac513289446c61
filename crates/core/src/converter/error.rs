//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// Converter binary not found or not configured.
    #[error("{tool} not found at path: {path}")]
    ToolNotFound { tool: String, path: PathBuf },

    /// No tool is configured for the requested output format.
    #[error("No converter configured for {format} output")]
    UnsupportedFormat { format: String },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The tool exited with a non-zero status.
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The tool exited cleanly but left no usable output.
    #[error("Output file missing or empty: {path}")]
    MissingOutput { path: PathBuf },

    /// Conversion timed out.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new conversion failed error with captured stderr.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn tool_not_found(tool: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::ToolNotFound {
            tool: tool.into(),
            path: path.into(),
        }
    }

    /// Whether this error is a wall-clock timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }

    /// Human-readable reason including the tool's error stream, if any.
    pub fn detail(&self) -> String {
        match self {
            Self::ConversionFailed {
                reason,
                stderr: Some(stderr),
            } if !stderr.trim().is_empty() => format!("{}: {}", reason, stderr.trim()),
            other => other.to_string(),
        }
    }
}
