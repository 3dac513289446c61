//! Platform, media and output-format classification types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Console platform a disc image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ps1,
    Ps2,
    Psp,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Ps1 => "PS1",
            Platform::Ps2 => "PS2",
            Platform::Psp => "PSP",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ps1" | "psx" | "playstation" => Ok(Platform::Ps1),
            "ps2" | "playstation2" => Ok(Platform::Ps2),
            "psp" => Ok(Platform::Psp),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Physical media layout, which decides the chdman sub-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscMedia {
    /// CUE/BIN track layout (`createcd`).
    Cd,
    /// Single-track ISO image (`createdvd` or maxcso).
    Dvd,
}

/// Signal that resolved a platform hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    Extension,
    Identifier,
    FolderName,
    FileSize,
    /// Supplied by the caller's default policy after discovery left it unknown.
    CallerDefault,
}

/// Classification attached to a job at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlatformHint {
    Resolved {
        platform: Platform,
        media: DiscMedia,
        source: HintSource,
    },
    /// No signal resolved the platform. The caller decides.
    Unknown,
}

impl PlatformHint {
    pub fn resolved(platform: Platform, media: DiscMedia, source: HintSource) -> Self {
        Self::Resolved {
            platform,
            media,
            source,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn platform(&self) -> Option<Platform> {
        match self {
            Self::Resolved { platform, .. } => Some(*platform),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for PlatformHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved {
                platform, source, ..
            } => write!(f, "{} (by {:?})", platform, source),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Compressed archival format produced by a converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Chd,
    Cso,
    Zso,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Chd => "chd",
            OutputFormat::Cso => "cso",
            OutputFormat::Zso => "zso",
        }
    }

    /// Whether the format is produced by maxcso rather than chdman.
    pub fn is_ciso(&self) -> bool {
        matches!(self, OutputFormat::Cso | OutputFormat::Zso)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "chd" => Ok(OutputFormat::Chd),
            "cso" => Ok(OutputFormat::Cso),
            "zso" => Ok(OutputFormat::Zso),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Discovery category toggles, one per supported input kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    #[serde(default = "enabled")]
    pub ps1_cue: bool,
    #[serde(default)]
    pub ps2_cue: bool,
    #[serde(default = "enabled")]
    pub ps2_iso: bool,
    #[serde(default)]
    pub psp_iso: bool,
}

fn enabled() -> bool {
    true
}

impl Default for CategorySet {
    fn default() -> Self {
        Self {
            ps1_cue: true,
            ps2_cue: false,
            ps2_iso: true,
            psp_iso: false,
        }
    }
}

impl CategorySet {
    pub fn all() -> Self {
        Self {
            ps1_cue: true,
            ps2_cue: true,
            ps2_iso: true,
            psp_iso: true,
        }
    }

    pub fn none() -> Self {
        Self {
            ps1_cue: false,
            ps2_cue: false,
            ps2_iso: false,
            psp_iso: false,
        }
    }

    pub fn cue_enabled(&self) -> bool {
        self.ps1_cue || self.ps2_cue
    }

    pub fn iso_enabled(&self) -> bool {
        self.ps2_iso || self.psp_iso
    }

    pub fn is_empty(&self) -> bool {
        !self.cue_enabled() && !self.iso_enabled()
    }

    /// Platform label for CUE descriptors. Both CD platforms convert identically.
    pub fn cue_platform(&self) -> Platform {
        if self.ps2_cue && !self.ps1_cue {
            Platform::Ps2
        } else {
            Platform::Ps1
        }
    }

    /// Whether a resolved ISO of this platform should become a job.
    pub fn allows_iso(&self, platform: Platform) -> bool {
        match platform {
            Platform::Ps2 => self.ps2_iso,
            Platform::Psp => self.psp_iso,
            Platform::Ps1 => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("CHD".parse::<OutputFormat>().unwrap(), OutputFormat::Chd);
        assert_eq!(".zso".parse::<OutputFormat>().unwrap(), OutputFormat::Zso);
        assert!("rvz".parse::<OutputFormat>().is_err());
        assert!(OutputFormat::Cso.is_ciso());
        assert!(!OutputFormat::Chd.is_ciso());
    }

    #[test]
    fn test_cue_platform_label() {
        let mut categories = CategorySet::none();
        categories.ps2_cue = true;
        assert_eq!(categories.cue_platform(), Platform::Ps2);

        categories.ps1_cue = true;
        assert_eq!(categories.cue_platform(), Platform::Ps1);
    }

    #[test]
    fn test_allows_iso() {
        let categories = CategorySet::default();
        assert!(categories.allows_iso(Platform::Ps2));
        assert!(!categories.allows_iso(Platform::Psp));
        assert!(CategorySet::none().is_empty());
    }

    #[test]
    fn test_hint_display() {
        let hint = PlatformHint::resolved(Platform::Psp, DiscMedia::Dvd, HintSource::FolderName);
        assert_eq!(hint.platform(), Some(Platform::Psp));
        assert!(hint.to_string().starts_with("PSP"));
        assert!(PlatformHint::Unknown.is_unknown());
    }
}
