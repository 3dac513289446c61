//! Running totals for a batch.

use std::time::Duration;

use super::types::ProgressUpdate;
use crate::executor::{JobOutcome, JobResult};

/// Owned by the dispatcher's control task; workers never touch it.
#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
    pub cancelled_count: usize,
    pub total_original_bytes: u64,
    pub total_output_bytes: u64,
    /// Durations of jobs that actually ran a tool.
    pub per_job_durations: Vec<Duration>,
}

impl AggregateStats {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            total_jobs,
            ..Default::default()
        }
    }

    pub fn record(&mut self, result: &JobResult) {
        self.completed_jobs += 1;
        match &result.outcome {
            JobOutcome::Success => {
                self.success_count += 1;
                self.total_original_bytes += result.original_size_bytes;
                self.total_output_bytes += result.output_size_bytes.unwrap_or(0);
                self.per_job_durations.push(result.duration);
            }
            JobOutcome::Failed(_) => {
                self.failure_count += 1;
                self.per_job_durations.push(result.duration);
            }
            JobOutcome::SkippedAlreadyDone => self.skipped_count += 1,
            JobOutcome::Cancelled => self.cancelled_count += 1,
        }
    }

    pub fn remaining(&self) -> usize {
        self.total_jobs.saturating_sub(self.completed_jobs)
    }

    pub fn fraction(&self) -> f64 {
        if self.total_jobs == 0 {
            1.0
        } else {
            (self.completed_jobs as f64 / self.total_jobs as f64).min(1.0)
        }
    }

    pub fn average_duration(&self) -> Option<Duration> {
        if self.per_job_durations.is_empty() {
            return None;
        }
        let total: Duration = self.per_job_durations.iter().sum();
        Some(total / self.per_job_durations.len() as u32)
    }

    /// Average job time × remaining jobs, spread across the workers.
    pub fn eta(&self, workers: usize) -> Option<Duration> {
        let average = self.average_duration()?;
        let remaining = self.remaining() as u32;
        Some(average * remaining / workers.max(1) as u32)
    }

    pub fn progress(&self, last_job: Duration, workers: usize) -> ProgressUpdate {
        ProgressUpdate {
            completed: self.completed_jobs,
            total: self.total_jobs,
            last_job_duration_secs: last_job.as_secs_f64(),
            fraction: self.fraction(),
            eta: self.eta(workers),
        }
    }
}
