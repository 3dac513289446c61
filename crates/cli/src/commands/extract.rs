use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use romcrush_core::archive::ArchiveExtractor;
use romcrush_core::Config;

use super::Status;

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Directory containing archives
    pub dir: PathBuf,

    /// Only look at the top-level directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Delete each archive after it is extracted
    #[arg(long)]
    pub delete: bool,
}

pub async fn execute(args: ExtractArgs, config: &Config) -> Result<ExitCode> {
    let extractor = ArchiveExtractor::from_tools(&config.tools);
    let delete = args.delete || config.archives.delete_after_extract;
    let report = extractor
        .extract_all(&args.dir, !args.no_recursive, delete)
        .await;

    for dir in &report.extracted {
        println!("extracted  {}", dir.display());
    }
    for (archive, error) in &report.failed {
        println!("failed     {}: {}", archive.display(), error);
    }
    println!();
    println!(
        "{} extracted, {} already extracted, {} deleted, {} failed",
        report.extracted.len(),
        report.already_extracted,
        report.deleted_archives,
        report.failed.len()
    );

    let status = if report.failed.is_empty() {
        Status::Clean
    } else {
        Status::Incomplete
    };
    Ok(status.into())
}
