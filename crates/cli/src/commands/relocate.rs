use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use romcrush_core::relocate::{find_outputs, relocate, RelocateOptions, OUTPUT_EXTENSIONS};

use super::Status;
use crate::observer::format_bytes;

#[derive(Args, Debug, Clone)]
pub struct RelocateArgs {
    /// Directory containing converted images
    pub source: PathBuf,

    /// Destination directory
    pub dest: PathBuf,

    /// Only look at the top-level source directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Copy instead of moving
    #[arg(long)]
    pub copy: bool,

    /// Strip region and revision tags from destination names
    #[arg(long)]
    pub clean_names: bool,

    /// Verify copies with a SHA-256 checksum
    #[arg(long)]
    pub verify: bool,

    /// Extensions to pick up, comma separated (default: chd,cso,zso)
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,
}

pub async fn execute(args: RelocateArgs) -> Result<ExitCode> {
    let extensions: Vec<String> = if args.extensions.is_empty() {
        OUTPUT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        args.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .collect()
    };

    let source = args.source.clone();
    let recursive = !args.no_recursive;
    let files = tokio::task::spawn_blocking(move || {
        let refs: Vec<&str> = extensions.iter().map(String::as_str).collect();
        find_outputs(&source, recursive, &refs)
    })
    .await
    .context("Search task failed")?;

    if files.is_empty() {
        println!("No converted images found in {}", args.source.display());
        return Ok(Status::Clean.into());
    }

    let options = RelocateOptions {
        copy: args.copy,
        clean_names: args.clean_names,
        verify: args.verify,
    };
    let report = relocate(&files, &args.dest, options)
        .await
        .with_context(|| format!("Failed to relocate into {:?}", args.dest))?;

    for (from, to) in &report.placed {
        println!("{}  ->  {}", from.display(), to.display());
    }
    for (path, error) in &report.failed {
        println!("failed     {}: {}", path.display(), error);
    }
    println!();
    println!(
        "{} {} ({}), {} failed",
        report.placed.len(),
        if args.copy { "copied" } else { "moved" },
        format_bytes(report.total_bytes as i64),
        report.failed.len()
    );

    let status = if report.failed.is_empty() {
        Status::Clean
    } else {
        Status::Incomplete
    };
    Ok(status.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(source: &TempDir, dest: &TempDir) -> RelocateArgs {
        RelocateArgs {
            source: source.path().to_path_buf(),
            dest: dest.path().join("library"),
            no_recursive: false,
            copy: false,
            clean_names: true,
            verify: false,
            extensions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_moves_outputs_with_clean_names() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::write(source.path().join("Game (USA).chd"), b"chd").unwrap();
        std::fs::write(source.path().join("Game (USA).cue"), b"cue").unwrap();

        execute(args(&source, &dest)).await.unwrap();

        assert!(dest.path().join("library/Game.chd").exists());
        assert!(!source.path().join("Game (USA).chd").exists());
        assert!(source.path().join("Game (USA).cue").exists());
    }

    #[tokio::test]
    async fn test_custom_extensions() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::write(source.path().join("Game.iso"), b"iso").unwrap();
        std::fs::write(source.path().join("Game.chd"), b"chd").unwrap();

        let mut args = args(&source, &dest);
        args.copy = true;
        args.extensions = vec![".ISO".to_string()];
        execute(args).await.unwrap();

        assert!(dest.path().join("library/Game.iso").exists());
        assert!(source.path().join("Game.iso").exists());
        assert!(!dest.path().join("library/Game.chd").exists());
    }
}
