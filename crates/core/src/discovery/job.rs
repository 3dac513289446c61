//! The unit of work produced by discovery.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::platform::PlatformHint;

/// One convertible unit: a descriptor plus the data files it references.
///
/// Immutable after discovery. The combined size is computed on first use.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    descriptor: PathBuf,
    siblings: Vec<PathBuf>,
    hint: PlatformHint,
    repairs: Vec<(String, PathBuf)>,
    original_size: OnceLock<u64>,
}

impl ConversionJob {
    pub fn new(descriptor: PathBuf, siblings: Vec<PathBuf>, hint: PlatformHint) -> Self {
        Self {
            descriptor,
            siblings,
            hint,
            repairs: Vec::new(),
            original_size: OnceLock::new(),
        }
    }

    /// Records references the descriptor names but that were found under another name.
    pub fn with_repairs(mut self, repairs: Vec<(String, PathBuf)>) -> Self {
        self.repairs = repairs;
        self
    }

    /// Path of the file driving the job.
    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Referenced data files, in descriptor order.
    pub fn siblings(&self) -> &[PathBuf] {
        &self.siblings
    }

    pub fn hint(&self) -> PlatformHint {
        self.hint
    }

    /// Pairs of (reference as written, file actually found).
    pub fn repairs(&self) -> &[(String, PathBuf)] {
        &self.repairs
    }

    /// Descriptor followed by all siblings.
    pub fn all_files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.descriptor.as_path()).chain(self.siblings.iter().map(|p| p.as_path()))
    }

    /// Lowercased extension of the descriptor.
    pub fn source_extension(&self) -> String {
        self.descriptor
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Sum of descriptor and sibling sizes. Missing files count as zero.
    pub fn original_size_bytes(&self) -> u64 {
        *self.original_size.get_or_init(|| {
            self.all_files()
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum()
        })
    }

    /// Key used by the progress ledger.
    pub fn ledger_key(&self) -> &Path {
        &self.descriptor
    }
}
