use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use romcrush_core::discovery::IsoClassifier;
use romcrush_core::{
    Config, ConversionJob, DiscoveryRequest, FormatPolicy, PlatformHint, WorkDiscovery,
};

use super::{SourceArgs, Status};
use crate::observer::format_bytes;

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ScanEntry {
    descriptor: PathBuf,
    platform: Option<String>,
    detected_by: Option<String>,
    target: Option<String>,
    size_bytes: u64,
    data_files: usize,
}

impl ScanEntry {
    fn new(job: &ConversionJob, policy: &FormatPolicy) -> Self {
        let (platform, detected_by) = match job.hint() {
            PlatformHint::Resolved {
                platform, source, ..
            } => (Some(platform.to_string()), Some(format!("{:?}", source))),
            PlatformHint::Unknown => (None, None),
        };
        Self {
            descriptor: job.descriptor().to_path_buf(),
            platform,
            detected_by,
            target: policy.resolve(job.hint()).map(|t| t.format.to_string()),
            size_bytes: job.original_size_bytes(),
            data_files: job.siblings().len(),
        }
    }
}

pub async fn execute(args: ScanArgs, config: &Config) -> Result<ExitCode> {
    let discovery = WorkDiscovery::new(IsoClassifier::new(
        config.classification.thresholds.clone(),
    ));
    let request = DiscoveryRequest::new(
        &args.source.dir,
        args.source.recursive(),
        args.source.category_set(),
    )
    .with_excluded_dir(config.post_success.backup_dir_name.clone());
    let report = tokio::task::spawn_blocking(move || discovery.discover(&request))
        .await
        .context("Discovery task failed")?
        .context("Discovery failed")?;

    let policy = FormatPolicy::from_config(&config.formats, &config.classification);
    let entries: Vec<ScanEntry> = report
        .jobs
        .iter()
        .map(|job| ScanEntry::new(job, &policy))
        .collect();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("Failed to serialize report")?
        );
        return Ok(Status::Clean.into());
    }

    for entry in &entries {
        println!(
            "{:<4} {:<4} {:>11}  {}{}",
            entry.platform.as_deref().unwrap_or("?"),
            entry.target.as_deref().unwrap_or("-"),
            format_bytes(entry.size_bytes as i64),
            entry.descriptor.display(),
            match &entry.detected_by {
                Some(source) if entry.data_files > 0 => {
                    format!(" ({} data files, by {})", entry.data_files, source)
                }
                Some(source) => format!(" (by {})", source),
                None => " (unclassified)".to_string(),
            }
        );
    }

    println!();
    println!(
        "{} jobs, {} total",
        report.jobs.len(),
        format_bytes(report.total_size_bytes() as i64)
    );
    if report.unclassified > 0 {
        println!(
            "{} ISOs could not be classified; pass --unknown-iso to convert them",
            report.unclassified
        );
    }
    if report.missing_siblings > 0 {
        println!("{} referenced data files are missing", report.missing_siblings);
    }
    if report.repaired_siblings > 0 {
        println!(
            "{} data file references were matched to renamed files",
            report.repaired_siblings
        );
    }
    if report.unreadable_descriptors > 0 {
        println!("{} CUE sheets could not be read", report.unreadable_descriptors);
    }
    if report.excluded_by_category > 0 {
        println!(
            "{} ISOs skipped because their category is disabled",
            report.excluded_by_category
        );
    }

    Ok(Status::Clean.into())
}
