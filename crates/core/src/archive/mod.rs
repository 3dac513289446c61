//! Archive extraction ahead of a batch.
//!
//! Dumps often arrive zipped. Each archive is unpacked into a folder named
//! after it, beside it, so discovery finds the images on its next walk.
//! Zip archives are handled in-process; everything else needs 7-Zip.

mod error;
mod extractor;

pub use error::ArchiveError;
pub use extractor::{ArchiveExtractor, ExtractOutcome, ExtractionReport};

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Archive container formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
    Rar,
    Tar,
    TarGz,
    Gzip,
}

impl ArchiveKind {
    /// Detects the kind from the file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".7z") {
            Some(Self::SevenZip)
        } else if name.ends_with(".rar") {
            Some(Self::Rar)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else if name.ends_with(".gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    /// Whether extraction goes through 7-Zip.
    pub fn needs_seven_zip(&self) -> bool {
        !matches!(self, Self::Zip)
    }
}

/// Archives under `root`, sorted.
pub fn find_archives(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let depth = if recursive { usize::MAX } else { 1 };
    let mut archives: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| ArchiveKind::detect(path).is_some())
        .collect();
    archives.sort();
    archives
}

/// Folder an archive unpacks into: its path without the archive extension.
pub fn extraction_dir(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();

    let stem = if lower.ends_with(".tar.gz") {
        name[..name.len() - ".tar.gz".len()].to_string()
    } else if lower.ends_with(".tgz") {
        name[..name.len() - ".tgz".len()].to_string()
    } else {
        archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(name)
    };
    archive.with_file_name(stem)
}

/// An archive plus the folder it was extracted into, if that folder exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leftover {
    pub archive: PathBuf,
    pub extracted_dir: Option<PathBuf>,
    /// Archive size plus the extracted folder's contents.
    pub size_bytes: u64,
}

/// Lists archives and their extracted folders that a finished batch left behind.
pub fn find_leftovers(root: &Path, recursive: bool) -> Vec<Leftover> {
    find_archives(root, recursive)
        .into_iter()
        .map(|archive| {
            let dir = extraction_dir(&archive);
            let extracted_dir = dir.is_dir().then_some(dir);
            let mut size_bytes = std::fs::metadata(&archive).map(|m| m.len()).unwrap_or(0);
            if let Some(dir) = &extracted_dir {
                size_bytes += WalkDir::new(dir)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum::<u64>();
            }
            Leftover {
                archive,
                extracted_dir,
                size_bytes,
            }
        })
        .collect()
}

/// Deletes extracted folders first, then the archives.
///
/// Returns how many items were removed and the failures.
pub fn cleanup_leftovers(leftovers: &[Leftover]) -> (usize, Vec<(PathBuf, String)>) {
    let mut removed = 0;
    let mut failed = Vec::new();

    for dir in leftovers.iter().filter_map(|l| l.extracted_dir.as_ref()) {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to delete extracted folder");
                failed.push((dir.clone(), e.to_string()));
            }
        }
    }
    for leftover in leftovers {
        match std::fs::remove_file(&leftover.archive) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %leftover.archive.display(), error = %e, "Failed to delete archive");
                failed.push((leftover.archive.clone(), e.to_string()));
            }
        }
    }
    (removed, failed)
}
