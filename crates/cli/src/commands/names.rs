use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use romcrush_core::names::{apply_renames, plan_renames};

use super::Status;

#[derive(Args, Debug, Clone)]
pub struct CleanNamesArgs {
    /// Directory containing ROM files
    pub dir: PathBuf,

    /// Only look at the top-level directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Rename the files instead of listing the plan
    #[arg(long)]
    pub apply: bool,
}

pub async fn execute(args: CleanNamesArgs) -> Result<ExitCode> {
    let dir = args.dir.clone();
    let recursive = !args.no_recursive;
    let plans = tokio::task::spawn_blocking(move || plan_renames(&dir, recursive))
        .await
        .context("Search task failed")?;

    if plans.is_empty() {
        println!("All file names are already clean");
        return Ok(Status::Clean.into());
    }

    for plan in &plans {
        let from = plan.from.file_name().unwrap_or_default().to_string_lossy();
        let to = plan.to.file_name().unwrap_or_default().to_string_lossy();
        println!("{}  ->  {}", from, to);
    }

    if !args.apply {
        println!();
        println!("{} files would be renamed; run again with --apply", plans.len());
        return Ok(Status::Clean.into());
    }

    let report = tokio::task::spawn_blocking(move || apply_renames(&plans))
        .await
        .context("Rename task failed")?;
    for (path, error) in &report.failed {
        println!("failed     {}: {}", path.display(), error);
    }
    println!();
    println!(
        "{} renamed, {} skipped (target exists), {} failed, {} CUE sheets updated",
        report.renamed,
        report.skipped_existing,
        report.failed.len(),
        report.rewritten_sheets
    );

    let status = if report.failed.is_empty() {
        Status::Clean
    } else {
        Status::Incomplete
    };
    Ok(status.into())
}
