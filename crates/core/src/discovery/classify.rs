//! Platform classification for ISO images.
//!
//! PS2 and PSP images share the `.iso` extension. Signals are tried in order:
//! serial identifiers in the file name, platform tokens in the folder
//! hierarchy, then file size. Anything left over is `Unknown`.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::platform::{DiscMedia, HintSource, Platform, PlatformHint};

const GIB: u64 = 1024 * 1024 * 1024;

/// Size thresholds for the last-resort heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Images at least this large are treated as PS2.
    #[serde(default = "default_large_iso_min_bytes")]
    pub large_iso_min_bytes: u64,

    /// Images at most this large are treated as PSP.
    #[serde(default = "default_small_iso_max_bytes")]
    pub small_iso_max_bytes: u64,
}

fn default_large_iso_min_bytes() -> u64 {
    GIB * 5 / 2
}

fn default_small_iso_max_bytes() -> u64 {
    GIB * 9 / 5
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            large_iso_min_bytes: default_large_iso_min_bytes(),
            small_iso_max_bytes: default_small_iso_max_bytes(),
        }
    }
}

static PS2_SERIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[^A-Z0-9])(?:SLUS|SLES|SCUS|SCES|SLPS|SLPM|SCPS|SCPM|SCED|SLED|SLKA|SCKA|SCAJ|PAPX|PBPX)[-_ .]?\d{3}\.?\d{2}(?:[^0-9]|$)",
    )
    .unwrap()
});

static PSP_SERIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[^A-Z0-9])(?:ULUS|ULES|UCUS|UCES|ULJM|ULJS|UCJS|UCAS|ULAS|ULKS|UCKS|NPUH|NPUG|NPEH|NPEG|NPJH|NPJG|NPHH|NPHG)[-_ .]?\d{5}(?:[^0-9]|$)",
    )
    .unwrap()
});

const PS2_FOLDER_TOKENS: &[&str] = &[
    "ps2",
    "playstation 2",
    "playstation2",
    "sony playstation 2",
    "sony - playstation 2",
];

const PSP_FOLDER_TOKENS: &[&str] = &[
    "psp",
    "playstation portable",
    "sony playstation portable",
    "sony - playstation portable",
];

/// Classifies ISO images into PS2 or PSP.
#[derive(Debug, Clone, Default)]
pub struct IsoClassifier {
    config: ClassificationConfig,
}

impl IsoClassifier {
    pub fn new(config: ClassificationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    /// Classifies an ISO, reading its size only when the name and folders are silent.
    pub fn classify(&self, path: &Path) -> PlatformHint {
        if let Some(platform) = Self::from_identifier(path) {
            return PlatformHint::resolved(platform, DiscMedia::Dvd, HintSource::Identifier);
        }
        if let Some(platform) = Self::from_folders(path) {
            return PlatformHint::resolved(platform, DiscMedia::Dvd, HintSource::FolderName);
        }
        match std::fs::metadata(path) {
            Ok(meta) => self.classify_size(path, meta.len()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read ISO size, leaving unclassified");
                PlatformHint::Unknown
            }
        }
    }

    /// Applies the size heuristic alone.
    pub fn classify_size(&self, path: &Path, size: u64) -> PlatformHint {
        if size >= self.config.large_iso_min_bytes {
            PlatformHint::resolved(Platform::Ps2, DiscMedia::Dvd, HintSource::FileSize)
        } else if size <= self.config.small_iso_max_bytes {
            PlatformHint::resolved(Platform::Psp, DiscMedia::Dvd, HintSource::FileSize)
        } else {
            warn!(
                path = %path.display(),
                size,
                "ISO platform is ambiguous, deferring to the caller's default"
            );
            PlatformHint::Unknown
        }
    }

    fn from_identifier(path: &Path) -> Option<Platform> {
        let name = path.file_name()?.to_string_lossy();
        if PS2_SERIAL.is_match(&name) {
            debug!(path = %path.display(), "PS2 serial found in file name");
            Some(Platform::Ps2)
        } else if PSP_SERIAL.is_match(&name) {
            debug!(path = %path.display(), "PSP serial found in file name");
            Some(Platform::Psp)
        } else {
            None
        }
    }

    /// Nearest ancestor folder whose whole name is a platform token wins.
    fn from_folders(path: &Path) -> Option<Platform> {
        path.parent()?
            .ancestors()
            .filter_map(|dir| dir.file_name())
            .map(|segment| segment.to_string_lossy().trim().to_lowercase())
            .find_map(|segment| {
                if PS2_FOLDER_TOKENS.contains(&segment.as_str()) {
                    Some(Platform::Ps2)
                } else if PSP_FOLDER_TOKENS.contains(&segment.as_str()) {
                    Some(Platform::Psp)
                } else {
                    None
                }
            })
    }
}
