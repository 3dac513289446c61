//! In-memory ledger used when persistence is disabled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::LedgerError;
use super::traits::ProgressLedger;

#[derive(Debug, Default)]
struct State {
    batch_id: Option<String>,
    completed: HashSet<PathBuf>,
}

/// Ledger that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a ledger pre-seeded with completed descriptors.
    pub fn with_completed<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let ledger = Self::new();
        ledger.lock().completed = paths.into_iter().map(Into::into).collect();
        ledger
    }
}

impl ProgressLedger for MemoryLedger {
    fn is_completed(&self, path: &Path) -> bool {
        self.lock().completed.contains(path)
    }

    fn mark_completed(&self, path: &Path) -> Result<(), LedgerError> {
        self.lock().completed.insert(path.to_path_buf());
        Ok(())
    }

    fn start_new_batch(&self, _source_dir: &Path) -> Result<String, LedgerError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.lock().batch_id = Some(id.clone());
        Ok(id)
    }

    fn clear(&self) -> Result<(), LedgerError> {
        let mut state = self.lock();
        state.completed.clear();
        state.batch_id = None;
        Ok(())
    }

    fn batch_id(&self) -> Option<String> {
        self.lock().batch_id.clone()
    }

    fn completed_count(&self) -> usize {
        self.lock().completed.len()
    }
}
