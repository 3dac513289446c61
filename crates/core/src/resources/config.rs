//! Configuration for resource-aware throttling.

use serde::{Deserialize, Serialize};

/// Thresholds are percentages in `1..=100`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Disable sampling entirely (always use the baseline).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_high_memory")]
    pub high_memory_percent: f32,

    #[serde(default = "default_high_cpu")]
    pub high_cpu_percent: f32,

    #[serde(default = "default_moderate_memory")]
    pub moderate_memory_percent: f32,

    #[serde(default = "default_moderate_cpu")]
    pub moderate_cpu_percent: f32,

    /// Memory level at which new job starts are held back.
    #[serde(default = "default_critical_memory")]
    pub critical_memory_percent: f32,

    /// Poll interval of the per-job memory gate.
    #[serde(default = "default_gate_poll_interval_ms")]
    pub gate_poll_interval_ms: u64,

    /// Longest a job waits at the memory gate before starting anyway.
    #[serde(default = "default_gate_max_wait_ms")]
    pub gate_max_wait_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_high_memory() -> f32 {
    90.0
}

fn default_high_cpu() -> f32 {
    95.0
}

fn default_moderate_memory() -> f32 {
    75.0
}

fn default_moderate_cpu() -> f32 {
    80.0
}

fn default_critical_memory() -> f32 {
    95.0
}

fn default_gate_poll_interval_ms() -> u64 {
    2_000
}

fn default_gate_max_wait_ms() -> u64 {
    60_000
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            high_memory_percent: default_high_memory(),
            high_cpu_percent: default_high_cpu(),
            moderate_memory_percent: default_moderate_memory(),
            moderate_cpu_percent: default_moderate_cpu(),
            critical_memory_percent: default_critical_memory(),
            gate_poll_interval_ms: default_gate_poll_interval_ms(),
            gate_max_wait_ms: default_gate_max_wait_ms(),
        }
    }
}

impl ResourceConfig {
    /// Sets the memory gate timing.
    pub fn with_gate_timing(mut self, poll_interval_ms: u64, max_wait_ms: u64) -> Self {
        self.gate_poll_interval_ms = poll_interval_ms;
        self.gate_max_wait_ms = max_wait_ms;
        self
    }
}
