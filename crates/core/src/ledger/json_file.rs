//! JSON file ledger.
//!
//! The whole ledger is rewritten after every recorded job: serialize to a
//! sibling temp file, fsync, then rename over the real file. A crash can lose
//! at most the entry being written, which only causes that job to run again.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::error::LedgerError;
use super::traits::ProgressLedger;

/// On-disk ledger contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    #[serde(default, alias = "completed_files")]
    pub completed_paths: BTreeSet<PathBuf>,
    /// Seconds since the Unix epoch of the last write.
    #[serde(default)]
    pub timestamp: f64,
}

/// Ledger persisted as a JSON document.
#[derive(Debug)]
pub struct JsonFileLedger {
    path: PathBuf,
    state: Mutex<LedgerSnapshot>,
}

impl JsonFileLedger {
    /// Opens the ledger at `path`. A missing or corrupt file yields an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = Self::load(&path);
        Self {
            path,
            state: Mutex::new(snapshot),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(path: &Path) -> LedgerSnapshot {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return LedgerSnapshot::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read progress ledger, starting empty");
                return LedgerSnapshot::default();
            }
        };

        match serde_json::from_slice::<LedgerSnapshot>(&bytes) {
            Ok(snapshot) => {
                debug!(
                    path = %path.display(),
                    completed = snapshot.completed_paths.len(),
                    "Loaded progress ledger"
                );
                snapshot
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt progress ledger, starting empty");
                LedgerSnapshot::default()
            }
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes the snapshot. Caller holds the state lock.
    fn persist(&self, snapshot: &mut LedgerSnapshot) -> Result<(), LedgerError> {
        snapshot.timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;
        let json = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(|e| LedgerError::io(&temp, e))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| LedgerError::io(&temp, e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| LedgerError::io(&self.path, e))?;
        Ok(())
    }
}

impl ProgressLedger for JsonFileLedger {
    fn is_completed(&self, path: &Path) -> bool {
        self.lock().completed_paths.contains(path)
    }

    fn mark_completed(&self, path: &Path) -> Result<(), LedgerError> {
        let mut state = self.lock();
        if !state.completed_paths.insert(path.to_path_buf()) {
            return Ok(());
        }
        self.persist(&mut state)
    }

    fn start_new_batch(&self, source_dir: &Path) -> Result<String, LedgerError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.lock();
        state.batch_id = Some(id.clone());
        state.source_dir = Some(source_dir.to_path_buf());
        self.persist(&mut state)?;
        Ok(id)
    }

    fn clear(&self) -> Result<(), LedgerError> {
        let mut state = self.lock();
        *state = LedgerSnapshot::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LedgerError::io(&self.path, e)),
        }
    }

    fn batch_id(&self) -> Option<String> {
        self.lock().batch_id.clone()
    }

    fn completed_count(&self) -> usize {
        self.lock().completed_paths.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_absent_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = JsonFileLedger::open(dir.path().join("progress.json"));
        assert_eq!(ledger.completed_count(), 0);
        assert!(ledger.batch_id().is_none());
    }

    #[test]
    fn test_progress_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");

        let ledger = JsonFileLedger::open(&path);
        let batch = ledger.start_new_batch(Path::new("/roms")).unwrap();
        ledger.mark_completed(Path::new("/roms/a.cue")).unwrap();
        ledger.mark_completed(Path::new("/roms/b.iso")).unwrap();
        drop(ledger);

        let reopened = JsonFileLedger::open(&path);
        assert_eq!(reopened.batch_id(), Some(batch));
        assert!(reopened.is_completed(Path::new("/roms/a.cue")));
        assert!(reopened.is_completed(Path::new("/roms/b.iso")));
        assert!(!reopened.is_completed(Path::new("/roms/c.cue")));
        assert!(!dir.path().join("progress.json.tmp").exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let ledger = JsonFileLedger::open(&path);
        ledger.mark_completed(Path::new("/roms/a.cue")).unwrap();
        assert!(path.exists());

        ledger.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(ledger.completed_count(), 0);
        ledger.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let ledger = JsonFileLedger::open(&path);
        assert_eq!(ledger.completed_count(), 0);
        ledger.mark_completed(Path::new("/roms/a.cue")).unwrap();
        assert_eq!(JsonFileLedger::open(&path).completed_count(), 1);
    }

    #[test]
    fn test_reads_legacy_field_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"batch_id": "abc", "source_dir": "/roms", "completed_files": ["/roms/a.cue"], "timestamp": 1700000000.5}"#,
        )
        .unwrap();

        let ledger = JsonFileLedger::open(&path);
        assert_eq!(ledger.batch_id().as_deref(), Some("abc"));
        assert!(ledger.is_completed(Path::new("/roms/a.cue")));
    }

    #[test]
    fn test_written_document_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let ledger = JsonFileLedger::open(&path);
        ledger.start_new_batch(Path::new("/roms")).unwrap();
        ledger.mark_completed(Path::new("/roms/a.cue")).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(value["batch_id"].is_string());
        assert_eq!(value["completed_paths"][0], "/roms/a.cue");
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    }
}
