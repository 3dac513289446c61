//! Resource monitoring.
//!
//! Samples CPU and memory pressure to size the worker pool at batch start and
//! to hold back individual job starts while memory is critically low. When the
//! platform offers no metrics, every decision falls back to the baseline.

mod config;
mod monitor;
mod sampler;

pub use config::ResourceConfig;
pub use monitor::{GateOutcome, PressureLevel, ResourceMonitor};
pub use sampler::{ResourceSampler, ResourceSnapshot, SysinfoSampler, UnavailableSampler};
