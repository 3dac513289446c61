//! Job outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::converter::ConverterError;

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Tool exited non-zero, left no output, or could not be launched.
    Execution,
    /// Tool exceeded its wall-clock limit.
    Timeout,
    /// No platform could be determined and no default was supplied.
    Unclassified,
    /// Filesystem error around the conversion.
    Io,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_converter(error: &ConverterError) -> Self {
        let kind = match error {
            ConverterError::Timeout { .. } => FailureKind::Timeout,
            ConverterError::Io(_) => FailureKind::Io,
            _ => FailureKind::Execution,
        };
        Self::new(kind, error.detail())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    /// Output already existed; no tool was run.
    SkippedAlreadyDone,
    Failed(FailureReason),
    /// Batch was cancelled before the job started.
    Cancelled,
}

impl JobOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SkippedAlreadyDone => "skipped",
            Self::Failed(reason) if reason.kind == FailureKind::Timeout => "timeout",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job's descriptor can be recorded as done.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Success | Self::SkippedAlreadyDone)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Result of executing one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub descriptor: PathBuf,
    pub outcome: JobOutcome,
    /// Set only on `Success`.
    pub output_path: Option<PathBuf>,
    /// Set only on `Success`.
    pub output_size_bytes: Option<u64>,
    pub original_size_bytes: u64,
    pub duration: Duration,
}

impl JobResult {
    pub fn new(descriptor: PathBuf, outcome: JobOutcome, duration: Duration) -> Self {
        Self {
            descriptor,
            outcome,
            output_path: None,
            output_size_bytes: None,
            original_size_bytes: 0,
            duration,
        }
    }

    pub fn success(
        descriptor: PathBuf,
        output_path: PathBuf,
        output_size_bytes: u64,
        original_size_bytes: u64,
        duration: Duration,
    ) -> Self {
        Self {
            descriptor,
            outcome: JobOutcome::Success,
            output_path: Some(output_path),
            output_size_bytes: Some(output_size_bytes),
            original_size_bytes,
            duration,
        }
    }

    pub fn failed(descriptor: PathBuf, reason: FailureReason, duration: Duration) -> Self {
        Self::new(descriptor, JobOutcome::Failed(reason), duration)
    }

    pub fn cancelled(descriptor: PathBuf) -> Self {
        Self::new(descriptor, JobOutcome::Cancelled, Duration::ZERO)
    }

    /// Original minus output size. Negative when the output grew.
    pub fn bytes_saved(&self) -> Option<i64> {
        self.output_size_bytes
            .map(|out| self.original_size_bytes as i64 - out as i64)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}
