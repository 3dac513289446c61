//! Target format selection.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ClassificationSection, ConfigError, FormatsConfig};
use crate::platform::{CategorySet, DiscMedia, HintSource, OutputFormat, Platform, PlatformHint};

/// Concrete conversion target for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub platform: Platform,
    pub media: DiscMedia,
    pub format: OutputFormat,
    pub source: HintSource,
}

/// Caller's choice of output format per platform, plus the platform assumed
/// for ISOs discovery could not classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatPolicy {
    pub ps2_iso: OutputFormat,
    pub psp_iso: OutputFormat,
    pub unknown_default: Option<Platform>,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            ps2_iso: OutputFormat::Chd,
            psp_iso: OutputFormat::Cso,
            unknown_default: None,
        }
    }
}

impl FormatPolicy {
    pub fn from_config(formats: &FormatsConfig, classification: &ClassificationSection) -> Self {
        Self {
            ps2_iso: formats.effective_ps2(),
            psp_iso: formats.psp_iso,
            unknown_default: classification.unknown_iso_default,
        }
    }

    pub fn with_unknown_default(mut self, platform: Platform) -> Self {
        self.unknown_default = Some(platform);
        self
    }

    /// Maps a hint to a target. `None` means the job cannot be classified.
    pub fn resolve(&self, hint: PlatformHint) -> Option<ResolvedTarget> {
        let (platform, media, source) = match hint {
            PlatformHint::Resolved {
                platform,
                media,
                source,
            } => (platform, media, source),
            PlatformHint::Unknown => (
                self.unknown_default?,
                DiscMedia::Dvd,
                HintSource::CallerDefault,
            ),
        };

        let format = match (media, platform) {
            (DiscMedia::Cd, _) => OutputFormat::Chd,
            (DiscMedia::Dvd, Platform::Ps2) => self.ps2_iso,
            (DiscMedia::Dvd, Platform::Psp) => self.psp_iso,
            (DiscMedia::Dvd, Platform::Ps1) => OutputFormat::Chd,
        };

        Some(ResolvedTarget {
            platform,
            media,
            format,
            source,
        })
    }

    /// Adjusts the policy to the installed tools before a batch starts.
    ///
    /// PS2 CSO/ZSO without maxcso falls back to CHD with a warning. PSP has
    /// no CHD option, so a missing compressor there is a configuration error,
    /// as is a missing chdman for any category that needs it.
    pub fn reconcile(
        mut self,
        categories: &CategorySet,
        supports: impl Fn(OutputFormat) -> bool,
    ) -> Result<Self, ConfigError> {
        let ps2_selected = categories.ps2_iso || self.unknown_default == Some(Platform::Ps2);
        let psp_selected = categories.psp_iso || self.unknown_default == Some(Platform::Psp);

        if ps2_selected && self.ps2_iso.is_ciso() && !supports(self.ps2_iso) {
            warn!(
                requested = %self.ps2_iso,
                "Compressor for PS2 output is not configured, falling back to CHD"
            );
            self.ps2_iso = OutputFormat::Chd;
        }

        if psp_selected && !supports(self.psp_iso) {
            return Err(ConfigError::ValidationError(format!(
                "PSP ISOs are selected for {} output but no tool for it is configured",
                self.psp_iso
            )));
        }

        let needs_chd =
            categories.cue_enabled() || (ps2_selected && self.ps2_iso == OutputFormat::Chd);
        if needs_chd && !supports(OutputFormat::Chd) {
            return Err(ConfigError::ValidationError(
                "CHD output is needed for the selected categories but chdman is not configured"
                    .to_string(),
            ));
        }

        Ok(self)
    }
}
