//! Trait definition for progress ledgers.

use std::path::Path;

use super::error::LedgerError;

/// Durable record of completed jobs.
///
/// Implementations guard their state with a single lock; workers call
/// `mark_completed` concurrently.
pub trait ProgressLedger: Send + Sync {
    /// Whether the descriptor was recorded as done.
    fn is_completed(&self, path: &Path) -> bool;

    /// Records a descriptor as done. Persists before returning.
    fn mark_completed(&self, path: &Path) -> Result<(), LedgerError>;

    /// Starts a new batch over `source_dir`, returning its fresh id.
    ///
    /// Completed entries are kept so an interrupted batch can resume.
    fn start_new_batch(&self, source_dir: &Path) -> Result<String, LedgerError>;

    /// Forgets all progress.
    fn clear(&self) -> Result<(), LedgerError>;

    /// Id of the current batch, if one was started or loaded.
    fn batch_id(&self) -> Option<String>;

    /// Number of recorded descriptors.
    fn completed_count(&self) -> usize;
}
