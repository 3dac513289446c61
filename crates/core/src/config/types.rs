use serde::{Deserialize, Serialize};

use crate::converter::ToolsConfig;
use crate::discovery::ClassificationConfig;
use crate::ledger::LedgerConfig;
use crate::platform::{OutputFormat, Platform};
use crate::resources::ResourceConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub classification: ClassificationSection,
    #[serde(default)]
    pub formats: FormatsConfig,
    #[serde(default)]
    pub post_success: PostSuccessConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub archives: ArchivesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on parallel conversions.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How often resource pressure is rechecked while a batch runs.
    #[serde(default = "default_resource_check_interval")]
    pub resource_check_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            resource_check_interval_secs: default_resource_check_interval(),
        }
    }
}

fn default_max_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

fn default_resource_check_interval() -> u64 {
    5
}

/// Size thresholds plus the fallback for ISOs nothing could classify.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationSection {
    #[serde(flatten)]
    pub thresholds: ClassificationConfig,

    /// Platform assumed for unclassified ISOs. Unset means they fail.
    #[serde(default)]
    pub unknown_iso_default: Option<Platform>,
}

/// PS2 emulator the output is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ps2Emulator {
    Pcsx2,
    #[serde(alias = "aether")]
    Aethersx2,
    Opl,
}

impl Ps2Emulator {
    /// Format the emulator handles best.
    pub fn recommended_format(&self) -> OutputFormat {
        match self {
            Ps2Emulator::Pcsx2 | Ps2Emulator::Aethersx2 => OutputFormat::Chd,
            Ps2Emulator::Opl => OutputFormat::Zso,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatsConfig {
    /// Explicit PS2 ISO target. Overrides the emulator preset.
    #[serde(default)]
    pub ps2_iso: Option<OutputFormat>,

    #[serde(default = "default_psp_format")]
    pub psp_iso: OutputFormat,

    #[serde(default)]
    pub ps2_emulator: Option<Ps2Emulator>,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            ps2_iso: None,
            psp_iso: default_psp_format(),
            ps2_emulator: None,
        }
    }
}

fn default_psp_format() -> OutputFormat {
    OutputFormat::Cso
}

impl FormatsConfig {
    /// PS2 target: explicit setting, then emulator preset, then CHD.
    pub fn effective_ps2(&self) -> OutputFormat {
        self.ps2_iso
            .or_else(|| self.ps2_emulator.map(|e| e.recommended_format()))
            .unwrap_or(OutputFormat::Chd)
    }
}

/// What happens to source files after a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSuccessConfig {
    #[serde(default = "default_true")]
    pub move_to_backup: bool,

    #[serde(default)]
    pub delete_originals: bool,

    /// Folder created beside each descriptor for moved originals.
    #[serde(default = "default_backup_dir_name")]
    pub backup_dir_name: String,
}

impl Default for PostSuccessConfig {
    fn default() -> Self {
        Self {
            move_to_backup: true,
            delete_originals: false,
            backup_dir_name: default_backup_dir_name(),
        }
    }
}

impl PostSuccessConfig {
    /// Leave sources where they are.
    pub fn leave_in_place() -> Self {
        Self {
            move_to_backup: false,
            delete_originals: false,
            ..Default::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_backup_dir_name() -> String {
    "original_backup".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchivesConfig {
    /// Extract archives under the root before discovery.
    #[serde(default)]
    pub extract_before_batch: bool,

    /// Delete each archive once it has been extracted.
    #[serde(default)]
    pub delete_after_extract: bool,
}
