//! Progress ledger for crash recovery.
//!
//! Records which descriptors finished (converted or already present) so an
//! interrupted batch can resume by excluding them. The ledger is advisory:
//! failing to read or write it never stops a batch.

mod error;
mod json_file;
mod memory;
mod traits;

pub use error::LedgerError;
pub use json_file::{JsonFileLedger, LedgerSnapshot};
pub use memory::MemoryLedger;
pub use traits::ProgressLedger;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Whether progress is persisted at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Location of the ledger file.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(".romcrush_progress.json")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_ledger_path(),
        }
    }
}

/// Opens the ledger described by the configuration.
pub fn open_ledger(config: &LedgerConfig) -> std::sync::Arc<dyn ProgressLedger> {
    if config.enabled {
        std::sync::Arc::new(JsonFileLedger::open(&config.path))
    } else {
        std::sync::Arc::new(MemoryLedger::new())
    }
}
