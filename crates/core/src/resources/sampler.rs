//! System resource sampling.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use sysinfo::{Disks, System};
use tracing::debug;

/// Point-in-time utilization reading. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_percent: f32,
    pub mem_percent: f32,
    /// Bytes written to disk since the previous sample.
    pub disk_write_bytes_delta: u64,
}

impl ResourceSnapshot {
    pub fn new(cpu_percent: f32, mem_percent: f32) -> Self {
        Self {
            cpu_percent,
            mem_percent,
            disk_write_bytes_delta: 0,
        }
    }
}

/// Source of resource snapshots.
pub trait ResourceSampler: Send + Sync {
    /// Returns `None` when metrics are unavailable.
    fn sample(&self) -> Option<ResourceSnapshot>;

    /// Best-effort request to release memory while the gate is closed.
    fn reclaim_hint(&self) {}
}

struct SysinfoState {
    system: System,
    last_disk_written: Option<u64>,
}

/// Sampler backed by `sysinfo`.
pub struct SysinfoSampler {
    state: Mutex<SysinfoState>,
}

impl SysinfoSampler {
    /// Creates a sampler, or `None` on platforms sysinfo does not support.
    pub fn new() -> Option<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }
        let mut system = System::new();
        // CPU usage is computed between refreshes; prime the first reading.
        system.refresh_cpu_usage();
        system.refresh_memory();
        Some(Self {
            state: Mutex::new(SysinfoState {
                system,
                last_disk_written: None,
            }),
        })
    }

    fn total_disk_written() -> u64 {
        Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| disk.usage().total_written_bytes)
            .sum()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&self) -> Option<ResourceSnapshot> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.system.refresh_cpu_usage();
        state.system.refresh_memory();

        let total = state.system.total_memory();
        if total == 0 {
            return None;
        }
        let mem_percent = state.system.used_memory() as f32 / total as f32 * 100.0;
        let cpu_percent = state.system.global_cpu_usage();

        let written = Self::total_disk_written();
        let disk_write_bytes_delta = state
            .last_disk_written
            .map(|last| written.saturating_sub(last))
            .unwrap_or(0);
        state.last_disk_written = Some(written);

        Some(ResourceSnapshot {
            cpu_percent,
            mem_percent,
            disk_write_bytes_delta,
        })
    }

    fn reclaim_hint(&self) {
        // Nothing to collect in-process; refresh so the next reading is current.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.system.refresh_memory();
        debug!("Memory reclamation hint issued");
    }
}

/// Sampler for environments without metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSampler;

impl ResourceSampler for UnavailableSampler {
    fn sample(&self) -> Option<ResourceSnapshot> {
        None
    }
}
