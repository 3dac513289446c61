//! Types for the scheduler module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, PostSuccessConfig};
use crate::executor::{FailureReason, FormatPolicy};
use crate::platform::CategorySet;

/// Everything the caller decides about one batch.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub root: PathBuf,
    pub recursive: bool,
    pub categories: CategorySet,
    pub format_policy: FormatPolicy,
    pub post_success: PostSuccessConfig,
    /// User-configured worker limit.
    pub max_workers: usize,
    /// Extract archives under the root before discovery.
    pub extract_archives: bool,
    /// Delete archives after a successful extraction.
    pub delete_archives: bool,
}

impl BatchRequest {
    /// Request with default categories and formats, leaving sources in place.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
            categories: CategorySet::default(),
            format_policy: FormatPolicy::default(),
            post_success: PostSuccessConfig::leave_in_place(),
            max_workers: 1,
            extract_archives: false,
            delete_archives: false,
        }
    }

    /// Request seeded from configuration.
    pub fn from_config(root: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            root: root.into(),
            recursive: true,
            categories: CategorySet::default(),
            format_policy: FormatPolicy::from_config(&config.formats, &config.classification),
            post_success: config.post_success.clone(),
            max_workers: config.scheduler.max_workers,
            extract_archives: config.archives.extract_before_batch,
            delete_archives: config.archives.delete_after_extract,
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_categories(mut self, categories: CategorySet) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_format_policy(mut self, policy: FormatPolicy) -> Self {
        self.format_policy = policy;
        self
    }

    pub fn with_post_success(mut self, post_success: PostSuccessConfig) -> Self {
        self.post_success = post_success;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }
}

/// Dispatcher lifecycle.
///
/// `Idle → Discovering → Sizing → Running → {Completing | Cancelling → Completing} → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Discovering,
    Sizing,
    Running,
    Cancelling,
    Completing,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchState::Idle => "idle",
            BatchState::Discovering => "discovering",
            BatchState::Sizing => "sizing",
            BatchState::Running => "running",
            BatchState::Cancelling => "cancelling",
            BatchState::Completing => "completing",
        };
        f.write_str(s)
    }
}

/// Pushed to observers after every finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub completed: usize,
    pub total: usize,
    pub last_job_duration_secs: f64,
    /// `completed / total`, never decreasing within a batch.
    pub fraction: f64,
    pub eta: Option<Duration>,
}

/// A job that ended in failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub descriptor: PathBuf,
    pub reason: FailureReason,
}

/// End-of-batch report.
///
/// `success_count + failure_count + skipped_already_done() + cancelled_count`
/// always equals `total_discovered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub workers: usize,
    pub peak_concurrency: usize,
    pub total_discovered: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Outputs found already present during this run.
    pub skipped_existing: usize,
    /// Jobs excluded up front because the ledger had them.
    pub resumed_from_ledger: usize,
    pub cancelled_count: usize,
    pub total_original_bytes: u64,
    pub total_output_bytes: u64,
    pub failures: Vec<FailedJob>,
    pub elapsed: Duration,
    pub ledger_cleared: bool,
}

impl BatchSummary {
    pub fn skipped_already_done(&self) -> usize {
        self.skipped_existing + self.resumed_from_ledger
    }

    pub fn bytes_saved(&self) -> i64 {
        self.total_original_bytes as i64 - self.total_output_bytes as i64
    }

    /// Percentage of converted input bytes that were saved.
    pub fn savings_percent(&self) -> f64 {
        if self.total_original_bytes == 0 {
            0.0
        } else {
            self.bytes_saved() as f64 / self.total_original_bytes as f64 * 100.0
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled_count > 0
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count == 0 && self.cancelled_count == 0
    }
}
