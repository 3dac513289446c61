//! Moving converted outputs and original sources around.
//!
//! Used for the move-to-backup post-success action and for gathering
//! finished images into a library folder.

mod error;
mod fs_ops;

pub use error::RelocateError;
pub use fs_ops::{
    copy_file, copy_verified, ensure_dir, move_file, sha256_file, try_atomic_move,
    unique_destination, SuffixStyle,
};

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::names::{has_extension, strip_tags};

/// Extensions of converted outputs.
pub const OUTPUT_EXTENSIONS: &[&str] = &["chd", "cso", "zso"];

/// Options for [`relocate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RelocateOptions {
    /// Copy instead of move.
    pub copy: bool,
    /// Strip region and revision tags from destination names.
    pub clean_names: bool,
    /// Verify copies with a SHA-256 checksum.
    pub verify: bool,
}

/// Outcome of a relocation pass.
#[derive(Debug, Default)]
pub struct RelocateReport {
    /// `(source, destination)` pairs that were placed.
    pub placed: Vec<(PathBuf, PathBuf)>,
    /// Sources that could not be placed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    pub total_bytes: u64,
}

/// Finds files with the given extensions under `root`, sorted.
pub fn find_outputs(root: &Path, recursive: bool, extensions: &[&str]) -> Vec<PathBuf> {
    let depth = if recursive { usize::MAX } else { 1 };
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, extensions))
        .collect();
    found.sort();
    found
}

fn destination_name(source: &Path, clean_names: bool) -> Option<String> {
    let file_name = source.file_name()?.to_string_lossy().into_owned();
    if !clean_names {
        return Some(file_name);
    }
    let stem = source.file_stem()?.to_string_lossy();
    let cleaned = strip_tags(&stem);
    if cleaned.is_empty() {
        return Some(file_name);
    }
    Some(match source.extension() {
        Some(ext) => format!("{}.{}", cleaned, ext.to_string_lossy()),
        None => cleaned,
    })
}

/// Moves or copies `files` into `dest`, never overwriting what is there.
///
/// Per-file failures are collected in the report; only a destination that
/// cannot be created fails the whole call.
pub async fn relocate(
    files: &[PathBuf],
    dest: &Path,
    options: RelocateOptions,
) -> Result<RelocateReport, RelocateError> {
    ensure_dir(dest).await?;
    let mut report = RelocateReport::default();

    for source in files {
        let Some(name) = destination_name(source, options.clean_names) else {
            report
                .failed
                .push((source.clone(), "path has no file name".to_string()));
            continue;
        };
        let destination = unique_destination(dest, &name, SuffixStyle::Parenthesized);

        let result = if options.copy {
            if options.verify {
                copy_verified(source, &destination).await
            } else {
                copy_file(source, &destination, false).await.map(|(n, _)| n)
            }
        } else {
            move_file(source, &destination, options.verify).await
        };

        match result {
            Ok(bytes) => {
                report.total_bytes += bytes;
                report.placed.push((source.clone(), destination));
            }
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Failed to relocate file");
                report.failed.push((source.clone(), e.to_string()));
            }
        }
    }

    info!(
        dest = %dest.display(),
        placed = report.placed.len(),
        failed = report.failed.len(),
        "Relocation finished"
    );
    Ok(report)
}

/// Moves `files` into `backup_dir`, renaming with `_n` on collisions.
///
/// Returns the new locations. Stops at the first failure; files already
/// moved stay in the backup folder.
pub async fn move_to_backup(
    files: &[PathBuf],
    backup_dir: &Path,
) -> Result<Vec<PathBuf>, RelocateError> {
    ensure_dir(backup_dir).await?;
    let mut moved = Vec::with_capacity(files.len());
    for source in files {
        if !source.exists() {
            continue;
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let destination = unique_destination(backup_dir, &name, SuffixStyle::Underscore);
        move_file(source, &destination, false).await?;
        moved.push(destination);
    }
    Ok(moved)
}
