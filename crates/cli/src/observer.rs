//! Terminal progress output.

use std::sync::Mutex;
use std::time::Duration;

use romcrush_core::scheduler::{BatchObserver, BatchState, ProgressUpdate};
use romcrush_core::{BatchSummary, JobOutcome, JobResult};

/// Prints one line per finished job.
#[derive(Default)]
pub struct ConsoleObserver {
    quiet: bool,
    last_job: Mutex<Option<(String, String)>>,
}

impl ConsoleObserver {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            last_job: Mutex::new(None),
        }
    }
}

impl BatchObserver for ConsoleObserver {
    fn on_state(&self, state: BatchState) {
        if self.quiet {
            return;
        }
        match state {
            BatchState::Discovering => println!("Scanning for disc images..."),
            BatchState::Cancelling => {
                println!("Cancelling: queued jobs will not start, running jobs will finish")
            }
            _ => {}
        }
    }

    fn on_job_finished(&self, result: &JobResult) {
        let name = result
            .descriptor
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.descriptor.display().to_string());
        let detail = match &result.outcome {
            JobOutcome::Success => match result.bytes_saved() {
                Some(saved) => format!("saved {}", format_bytes(saved)),
                None => String::new(),
            },
            JobOutcome::Failed(reason) => reason.to_string(),
            JobOutcome::SkippedAlreadyDone => "output exists".to_string(),
            JobOutcome::Cancelled => String::new(),
        };
        let mut last = self.last_job.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some((format!("{:<9} {}", result.outcome.label(), name), detail));
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if self.quiet {
            return;
        }
        let last = self
            .last_job
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let (line, detail) = last.unwrap_or_default();
        let eta = update
            .eta
            .map(|eta| format!(" ETA {}", format_duration(eta)))
            .unwrap_or_default();
        let width = update.total.to_string().len();
        println!(
            "[{:>width$}/{}] {:>5.1}%{} {} ({:.1}s){}",
            update.completed,
            update.total,
            update.fraction * 100.0,
            eta,
            line,
            update.last_job_duration_secs,
            if detail.is_empty() {
                String::new()
            } else {
                format!(" - {}", detail)
            },
            width = width,
        );
    }
}

/// Prints the end-of-batch report.
pub fn print_summary(summary: &BatchSummary) {
    println!();
    println!("Batch {}", summary.batch_id);
    println!(
        "  Discovered:  {} ({} workers, peak {})",
        summary.total_discovered, summary.workers, summary.peak_concurrency
    );
    println!("  Converted:   {}", summary.success_count);
    println!(
        "  Skipped:     {} ({} existing, {} resumed)",
        summary.skipped_already_done(),
        summary.skipped_existing,
        summary.resumed_from_ledger
    );
    println!("  Failed:      {}", summary.failure_count);
    if summary.cancelled_count > 0 {
        println!("  Cancelled:   {}", summary.cancelled_count);
    }
    println!(
        "  Size:        {} -> {} (saved {}, {:.1}%)",
        format_bytes(summary.total_original_bytes as i64),
        format_bytes(summary.total_output_bytes as i64),
        format_bytes(summary.bytes_saved()),
        summary.savings_percent()
    );
    println!("  Elapsed:     {}", format_duration(summary.elapsed));

    if !summary.failures.is_empty() {
        println!();
        println!("Failures:");
        for failed in &summary.failures {
            println!("  {}: {}", failed.descriptor.display(), failed.reason);
        }
    }
}

/// Human-readable byte count using binary units. Negative values keep their sign.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let sign = if bytes < 0 { "-" } else { "" };
    let mut value = bytes.unsigned_abs() as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}{} {}", sign, value as u64, UNITS[0])
    } else {
        format!("{}{:.2} {}", sign, value, UNITS[unit])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m {:02}s", m, s),
        (h, m, _) => format!("{}h {:02}m", h, m),
    }
}
