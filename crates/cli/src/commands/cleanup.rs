use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use romcrush_core::archive::{cleanup_leftovers, find_leftovers};

use super::Status;
use crate::observer::format_bytes;

#[derive(Args, Debug, Clone)]
pub struct CleanupArgs {
    /// Directory to search
    pub dir: PathBuf,

    /// Only look at the top-level directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Delete what was found instead of listing it
    #[arg(long)]
    pub apply: bool,
}

pub async fn execute(args: CleanupArgs) -> Result<ExitCode> {
    let dir = args.dir.clone();
    let recursive = !args.no_recursive;
    let leftovers = tokio::task::spawn_blocking(move || find_leftovers(&dir, recursive))
        .await
        .context("Search task failed")?;

    if leftovers.is_empty() {
        println!("No extracted archives found");
        return Ok(Status::Clean.into());
    }

    let mut total = 0u64;
    for leftover in &leftovers {
        total += leftover.size_bytes;
        match &leftover.extracted_dir {
            Some(dir) => println!(
                "{:>11}  {} + {}",
                format_bytes(leftover.size_bytes as i64),
                leftover.archive.display(),
                dir.display()
            ),
            None => println!(
                "{:>11}  {}",
                format_bytes(leftover.size_bytes as i64),
                leftover.archive.display()
            ),
        }
    }
    println!();
    println!("{} items, {}", leftovers.len(), format_bytes(total as i64));

    if !args.apply {
        println!("Run again with --apply to delete them");
        return Ok(Status::Clean.into());
    }

    let (deleted, failed) =
        tokio::task::spawn_blocking(move || cleanup_leftovers(&leftovers))
            .await
            .context("Cleanup task failed")?;
    for (path, error) in &failed {
        println!("failed     {}: {}", path.display(), error);
    }
    println!("{} deleted, {} failed", deleted, failed.len());

    let status = if failed.is_empty() {
        Status::Clean
    } else {
        Status::Incomplete
    };
    Ok(status.into())
}
