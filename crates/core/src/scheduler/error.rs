//! Error types for the scheduler.

use thiserror::Error;

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;

/// Errors that prevent a batch from running at all.
///
/// Individual job failures never surface here; they are part of the summary.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Invalid batch configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("A batch is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl BatchError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::ValidationError(msg.into()))
    }
}
