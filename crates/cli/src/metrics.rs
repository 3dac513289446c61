//! Prometheus metrics for batch runs.
//!
//! The registry holds every counter the core library records plus a few
//! gauges describing the most recent batch. The text exposition is written
//! to a file at the end of `convert` when `--metrics-file` is given.

use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{self, Encoder, Gauge, IntGauge, Registry, TextEncoder};

use romcrush_core::BatchSummary;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Worker pool size chosen for the last batch.
pub static BATCH_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("romcrush_batch_workers", "Worker pool size of the last batch").unwrap()
});

/// Highest number of jobs seen running at once in the last batch.
pub static BATCH_PEAK_CONCURRENCY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "romcrush_batch_peak_concurrency",
        "Peak concurrent jobs in the last batch",
    )
    .unwrap()
});

/// Jobs the last batch discovered.
pub static BATCH_DISCOVERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("romcrush_batch_discovered", "Jobs discovered by the last batch").unwrap()
});

/// Wall-clock duration of the last batch.
pub static BATCH_ELAPSED: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "romcrush_batch_elapsed_seconds",
        "Wall-clock duration of the last batch",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(BATCH_WORKERS.clone()))
        .unwrap();
    registry
        .register(Box::new(BATCH_PEAK_CONCURRENCY.clone()))
        .unwrap();
    registry
        .register(Box::new(BATCH_DISCOVERED.clone()))
        .unwrap();
    registry
        .register(Box::new(BATCH_ELAPSED.clone()))
        .unwrap();

    for metric in romcrush_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Updates the last-batch gauges from a summary.
pub fn record_summary(summary: &BatchSummary) {
    BATCH_WORKERS.set(summary.workers as i64);
    BATCH_PEAK_CONCURRENCY.set(summary.peak_concurrency as i64);
    BATCH_DISCOVERED.set(summary.total_discovered as i64);
    BATCH_ELAPSED.set(summary.elapsed.as_secs_f64());
}

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub fn write_metrics_file(path: &Path) -> Result<()> {
    std::fs::write(path, encode_metrics())
        .with_context(|| format!("Failed to write metrics to {:?}", path))
}
