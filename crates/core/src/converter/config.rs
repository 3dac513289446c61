//! Configuration for the external converter tools.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Paths and limits for the external tools.
///
/// A tool left as `None` is treated as not installed; categories that need it
/// are rejected before a batch starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the chdman binary.
    #[serde(default = "default_chdman_path")]
    pub chdman: Option<PathBuf>,

    /// Path to the maxcso binary (CSO/ZSO output).
    #[serde(default)]
    pub maxcso: Option<PathBuf>,

    /// Path to the 7-Zip binary (archive extraction).
    #[serde(default)]
    pub seven_zip: Option<PathBuf>,

    /// Timeout for a single conversion in seconds.
    #[serde(default = "default_conversion_timeout")]
    pub conversion_timeout_secs: u64,

    /// Timeout for a single archive extraction in seconds.
    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,

    /// Maximum bytes of tool stderr kept in failure reasons.
    #[serde(default = "default_stderr_limit")]
    pub stderr_limit_bytes: usize,
}

fn default_chdman_path() -> Option<PathBuf> {
    Some(PathBuf::from("chdman"))
}

fn default_conversion_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_extraction_timeout() -> u64 {
    3600 // 1 hour
}

fn default_stderr_limit() -> usize {
    4096
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            chdman: default_chdman_path(),
            maxcso: None,
            seven_zip: None,
            conversion_timeout_secs: default_conversion_timeout(),
            extraction_timeout_secs: default_extraction_timeout(),
            stderr_limit_bytes: default_stderr_limit(),
        }
    }
}

impl ToolsConfig {
    /// Creates a config with only chdman configured.
    pub fn with_chdman(path: impl Into<PathBuf>) -> Self {
        Self {
            chdman: Some(path.into()),
            ..Default::default()
        }
    }

    /// Sets the maxcso path.
    pub fn with_maxcso(mut self, path: impl Into<PathBuf>) -> Self {
        self.maxcso = Some(path.into());
        self
    }

    /// Sets the 7-Zip path.
    pub fn with_seven_zip(mut self, path: impl Into<PathBuf>) -> Self {
        self.seven_zip = Some(path.into());
        self
    }

    /// Sets the conversion timeout.
    pub fn with_conversion_timeout(mut self, secs: u64) -> Self {
        self.conversion_timeout_secs = secs;
        self
    }
}
