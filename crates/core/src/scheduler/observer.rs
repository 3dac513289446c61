//! Progress observers.

use super::types::{BatchState, BatchSummary, ProgressUpdate};
use crate::executor::JobResult;

/// Receives batch events from the dispatcher's control task.
///
/// Callbacks run inline; keep them short.
pub trait BatchObserver: Send + Sync {
    fn on_state(&self, _state: BatchState) {}

    fn on_job_finished(&self, _result: &JobResult) {}

    fn on_progress(&self, _update: &ProgressUpdate) {}

    fn on_batch_finished(&self, _summary: &BatchSummary) {}
}
