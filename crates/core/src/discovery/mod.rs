//! Work discovery.
//!
//! Walks a directory tree for CUE and ISO descriptors, resolves the data files
//! each CUE sheet references, classifies ISOs by platform and returns a
//! deduplicated job list sorted by absolute path.
//!
//! Per-file problems never abort a pass. An unreadable CUE sheet still becomes
//! a job (with no siblings); a missing data file is logged and counted.

mod classify;
mod cue;
mod error;
mod job;

pub use classify::{ClassificationConfig, IsoClassifier};
pub use cue::{
    is_repaired_sheet, parse_cue_references, repaired_sheet_path, resolve_siblings,
    rewrite_cue_references, SiblingResolution,
};
pub use error::DiscoveryError;
pub use job::ConversionJob;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::names::has_extension;
use crate::platform::{CategorySet, DiscMedia, HintSource, PlatformHint};

/// What to scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub root: PathBuf,
    pub recursive: bool,
    pub categories: CategorySet,
    /// Directory names never descended into, such as the backup folder.
    #[serde(default)]
    pub excluded_dirs: Vec<String>,
}

impl DiscoveryRequest {
    pub fn new(root: impl Into<PathBuf>, recursive: bool, categories: CategorySet) -> Self {
        Self {
            root: root.into(),
            recursive,
            categories,
            excluded_dirs: Vec::new(),
        }
    }

    /// Skips every directory with this name below the root. Case-insensitive.
    pub fn with_excluded_dir(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.excluded_dirs.push(name);
        }
        self
    }
}

/// Result of a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Jobs sorted by descriptor path.
    pub jobs: Vec<ConversionJob>,
    /// CUE sheets that could not be read.
    pub unreadable_descriptors: usize,
    /// References that could not be located, even after repair.
    pub missing_siblings: usize,
    /// References satisfied by the repair lookup.
    pub repaired_siblings: usize,
    /// ISOs no signal could classify.
    pub unclassified: usize,
    /// ISOs classified into a platform whose category is disabled.
    pub excluded_by_category: usize,
}

impl DiscoveryReport {
    pub fn total_size_bytes(&self) -> u64 {
        self.jobs.iter().map(|j| j.original_size_bytes()).sum()
    }
}

/// Produces conversion jobs from a directory tree.
#[derive(Debug, Clone, Default)]
pub struct WorkDiscovery {
    classifier: IsoClassifier,
}

impl WorkDiscovery {
    pub fn new(classifier: IsoClassifier) -> Self {
        Self { classifier }
    }

    /// Runs a discovery pass. Blocking; call from `spawn_blocking` in async code.
    pub fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryReport, DiscoveryError> {
        let root = &request.root;
        if !root.exists() {
            return Err(DiscoveryError::RootNotFound { path: root.clone() });
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory { path: root.clone() });
        }

        let mut report = DiscoveryReport::default();
        let mut jobs: BTreeMap<PathBuf, ConversionJob> = BTreeMap::new();

        for path in Self::candidates(request) {
            let key = absolute(&path);
            if jobs.contains_key(&key) {
                continue;
            }

            let job = if has_extension(&key, &["cue"]) {
                self.cue_job(&key, &request.categories, &mut report)
            } else {
                self.iso_job(&key, &request.categories, &mut report)
            };

            if let Some(job) = job {
                jobs.insert(key, job);
            }
        }

        report.jobs = jobs.into_values().collect();
        info!(
            root = %root.display(),
            jobs = report.jobs.len(),
            missing_siblings = report.missing_siblings,
            unclassified = report.unclassified,
            "Discovery finished"
        );
        Ok(report)
    }

    fn candidates(request: &DiscoveryRequest) -> Vec<PathBuf> {
        let mut extensions = Vec::new();
        if request.categories.cue_enabled() {
            extensions.push("cue");
        }
        if request.categories.iso_enabled() {
            extensions.push("iso");
        }

        let depth = if request.recursive { usize::MAX } else { 1 };
        WalkDir::new(&request.root)
            .max_depth(depth)
            .into_iter()
            .filter_entry(|entry| {
                let excluded = entry.depth() > 0
                    && entry.file_type().is_dir()
                    && request
                        .excluded_dirs
                        .iter()
                        .any(|name| entry.file_name().eq_ignore_ascii_case(name));
                if excluded {
                    debug!(path = %entry.path().display(), "Skipping excluded directory");
                }
                !excluded
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_extension(path, &extensions) && !is_repaired_sheet(path))
            .collect()
    }

    fn cue_job(
        &self,
        descriptor: &Path,
        categories: &CategorySet,
        report: &mut DiscoveryReport,
    ) -> Option<ConversionJob> {
        let hint = PlatformHint::resolved(
            categories.cue_platform(),
            DiscMedia::Cd,
            HintSource::Extension,
        );

        let content = match std::fs::read(descriptor) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(path = %descriptor.display(), error = %e, "Cannot read CUE sheet");
                report.unreadable_descriptors += 1;
                return Some(ConversionJob::new(descriptor.to_path_buf(), Vec::new(), hint));
            }
        };

        let references = parse_cue_references(&content);
        if references.is_empty() {
            warn!(path = %descriptor.display(), "CUE sheet references no BINARY files");
        }
        let resolution = resolve_siblings(descriptor, &references);
        report.missing_siblings += resolution.missing.len();
        report.repaired_siblings += resolution.repaired.len();

        Some(
            ConversionJob::new(descriptor.to_path_buf(), resolution.found, hint)
                .with_repairs(resolution.repaired),
        )
    }

    fn iso_job(
        &self,
        image: &Path,
        categories: &CategorySet,
        report: &mut DiscoveryReport,
    ) -> Option<ConversionJob> {
        let hint = self.classifier.classify(image);
        match hint.platform() {
            Some(platform) if !categories.allows_iso(platform) => {
                debug!(path = %image.display(), %platform, "ISO category disabled, skipping");
                report.excluded_by_category += 1;
                None
            }
            Some(_) => Some(ConversionJob::new(image.to_path_buf(), Vec::new(), hint)),
            None => {
                report.unclassified += 1;
                Some(ConversionJob::new(image.to_path_buf(), Vec::new(), hint))
            }
        }
    }
}

/// Canonical absolute path, falling back to joining with the working directory.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}
