//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Dispatcher (job outcomes, durations, space reclaimed)
//! - Resource gate (memory-pressure waits)
//! - Archive extraction

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Dispatcher Metrics
// =============================================================================

/// Finished jobs by outcome.
pub static JOBS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("romcrush_jobs_total", "Total conversion jobs finished"),
        &["outcome"], // "success", "skipped", "failed", "timeout", "cancelled"
    )
    .unwrap()
});

/// Job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("romcrush_job_duration_seconds", "Duration of conversion jobs")
            .buckets(vec![
                1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0,
            ]),
        &["outcome"],
    )
    .unwrap()
});

/// Bytes reclaimed by successful conversions.
pub static BYTES_SAVED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "romcrush_bytes_saved_total",
        "Total bytes saved by successful conversions",
    )
    .unwrap()
});

/// Batches finished by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("romcrush_batches_total", "Total batches finished"),
        &["result"], // "clean", "with_failures", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// Resource Gate Metrics
// =============================================================================

/// Job starts held by the memory gate, by how the hold ended.
pub static MEMORY_GATE_HOLDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "romcrush_memory_gate_holds_total",
            "Job starts delayed by critical memory pressure",
        ),
        &["result"], // "eased", "timed_out"
    )
    .unwrap()
});

// =============================================================================
// Archive Metrics
// =============================================================================

/// Archive extractions by result.
pub static EXTRACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("romcrush_extractions_total", "Total archive extractions"),
        &["result"], // "extracted", "skipped", "failed"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Dispatcher
        Box::new(JOBS_TOTAL.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(BYTES_SAVED.clone()),
        Box::new(BATCHES_TOTAL.clone()),
        // Resource gate
        Box::new(MEMORY_GATE_HOLDS.clone()),
        // Archives
        Box::new(EXTRACTIONS_TOTAL.clone()),
    ]
}
