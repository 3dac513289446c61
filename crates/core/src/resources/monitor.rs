//! Worker-count policy and the per-job memory gate.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::ResourceConfig;
use super::sampler::{ResourceSampler, ResourceSnapshot, SysinfoSampler, UnavailableSampler};

/// Coarse classification of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    Normal,
    Moderate,
    High,
}

/// How a job got past the memory gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Memory was below the critical level.
    Clear,
    /// Metrics unavailable; the gate does nothing.
    Unavailable,
    /// Pressure dropped after waiting.
    Waited(Duration),
    /// Pressure persisted past the maximum wait; the job starts anyway.
    TimedOut(Duration),
}

/// Samples resources and turns readings into scheduling decisions.
pub struct ResourceMonitor {
    sampler: Arc<dyn ResourceSampler>,
    config: ResourceConfig,
}

impl ResourceMonitor {
    pub fn new(sampler: Arc<dyn ResourceSampler>, config: ResourceConfig) -> Self {
        Self { sampler, config }
    }

    /// Monitor backed by the host's metrics, falling back to none when unsupported or disabled.
    pub fn system(config: ResourceConfig) -> Self {
        let sampler: Arc<dyn ResourceSampler> = if !config.enabled {
            Arc::new(UnavailableSampler)
        } else {
            match SysinfoSampler::new() {
                Some(sampler) => Arc::new(sampler),
                None => {
                    debug!("Resource metrics unsupported on this platform");
                    Arc::new(UnavailableSampler)
                }
            }
        };
        Self::new(sampler, config)
    }

    /// Monitor that never has metrics.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(UnavailableSampler), ResourceConfig::default())
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Takes a reading, or `None` when metrics are unavailable or disabled.
    pub fn sample(&self) -> Option<ResourceSnapshot> {
        if !self.config.enabled {
            return None;
        }
        self.sampler.sample()
    }

    /// Logical cores on this host.
    pub fn available_cores() -> usize {
        num_cpus::get().max(1)
    }

    /// `min(user_limit, cores - 1)`, never below one.
    pub fn baseline(user_limit: usize, cores: usize) -> usize {
        user_limit.min(cores.saturating_sub(1)).max(1)
    }

    pub fn pressure(&self, snapshot: &ResourceSnapshot) -> PressureLevel {
        let c = &self.config;
        if snapshot.mem_percent >= c.high_memory_percent || snapshot.cpu_percent >= c.high_cpu_percent
        {
            PressureLevel::High
        } else if snapshot.mem_percent >= c.moderate_memory_percent
            || snapshot.cpu_percent >= c.moderate_cpu_percent
        {
            PressureLevel::Moderate
        } else {
            PressureLevel::Normal
        }
    }

    /// Scales the baseline down under pressure. Without a snapshot the baseline stands.
    pub fn recommended_worker_count(
        &self,
        baseline: usize,
        snapshot: Option<&ResourceSnapshot>,
    ) -> usize {
        let baseline = baseline.max(1);
        let Some(snapshot) = snapshot else {
            return baseline;
        };
        match self.pressure(snapshot) {
            PressureLevel::High => (baseline / 2).max(1),
            PressureLevel::Moderate => (baseline * 3 / 4).max(1),
            PressureLevel::Normal => baseline,
        }
    }

    /// Holds the caller while memory is at or above the critical level.
    ///
    /// Polls at the configured interval and gives up after the maximum wait.
    pub async fn wait_for_memory_headroom(&self) -> GateOutcome {
        let poll = Duration::from_millis(self.config.gate_poll_interval_ms.max(1));
        let max_wait = Duration::from_millis(self.config.gate_max_wait_ms);
        let started = Instant::now();
        let mut announced = false;

        loop {
            let Some(snapshot) = self.sample() else {
                return if announced {
                    GateOutcome::Waited(started.elapsed())
                } else {
                    GateOutcome::Unavailable
                };
            };

            if snapshot.mem_percent < self.config.critical_memory_percent {
                return if announced {
                    let waited = started.elapsed();
                    info!(waited_ms = waited.as_millis() as u64, "Memory pressure eased, starting job");
                    GateOutcome::Waited(waited)
                } else {
                    GateOutcome::Clear
                };
            }

            let elapsed = started.elapsed();
            if elapsed >= max_wait {
                warn!(
                    mem_percent = snapshot.mem_percent,
                    waited_ms = elapsed.as_millis() as u64,
                    "Memory still critical, starting job anyway"
                );
                return GateOutcome::TimedOut(elapsed);
            }

            if !announced {
                warn!(
                    mem_percent = snapshot.mem_percent,
                    "Memory critical, holding job start"
                );
                announced = true;
            }
            self.sampler.reclaim_hint();
            tokio::time::sleep(poll.min(max_wait - elapsed)).await;
        }
    }
}
