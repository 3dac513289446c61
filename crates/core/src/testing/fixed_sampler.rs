//! Scripted resource sampler for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::resources::{ResourceSampler, ResourceSnapshot};

#[derive(Debug)]
struct Script {
    queue: VecDeque<Option<ResourceSnapshot>>,
    last: Option<ResourceSnapshot>,
}

/// Sampler that replays a fixed sequence of readings.
///
/// After the sequence runs out the final reading repeats. Clones share state.
#[derive(Debug, Clone)]
pub struct FixedSampler {
    script: Arc<Mutex<Script>>,
    samples: Arc<AtomicUsize>,
    reclaim_hints: Arc<AtomicUsize>,
}

impl FixedSampler {
    pub fn sequence(readings: Vec<Option<ResourceSnapshot>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                queue: readings.into(),
                last: None,
            })),
            samples: Arc::new(AtomicUsize::new(0)),
            reclaim_hints: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always returns the same reading.
    pub fn constant(cpu_percent: f32, mem_percent: f32) -> Self {
        Self::sequence(vec![Some(ResourceSnapshot::new(cpu_percent, mem_percent))])
    }

    /// Never has metrics.
    pub fn unavailable() -> Self {
        Self::sequence(Vec::new())
    }

    pub fn samples_taken(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn reclaim_hints(&self) -> usize {
        self.reclaim_hints.load(Ordering::SeqCst)
    }
}

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> Option<ResourceSnapshot> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match script.queue.pop_front() {
            Some(reading) => {
                script.last = reading;
                reading
            }
            None => script.last,
        }
    }

    fn reclaim_hint(&self) {
        self.reclaim_hints.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_repeats_last() {
        let sampler = FixedSampler::sequence(vec![
            Some(ResourceSnapshot::new(1.0, 2.0)),
            Some(ResourceSnapshot::new(3.0, 4.0)),
        ]);
        assert_eq!(sampler.sample().unwrap().cpu_percent, 1.0);
        assert_eq!(sampler.sample().unwrap().cpu_percent, 3.0);
        assert_eq!(sampler.sample().unwrap().cpu_percent, 3.0);
        assert_eq!(sampler.samples_taken(), 3);
        assert!(FixedSampler::unavailable().sample().is_none());
    }
}
