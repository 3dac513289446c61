//! CUE sheet parsing and sibling resolution.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::names::clean_game_name;

static FILE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)FILE\s+"([^"]+)"\s+BINARY"#).unwrap());

static TRACK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(Track\s*(\d+)\)").unwrap());

/// Suffix of the temporary sheet handed to the converter when references were repaired.
const REPAIRED_SHEET_SUFFIX: &str = ".repaired.cue";

/// Extracts the data file names referenced by a CUE sheet, in order.
pub fn parse_cue_references(content: &str) -> Vec<String> {
    FILE_ENTRY
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Replaces `FILE` references. Each pair is (as written in the sheet, replacement).
///
/// Entries not listed are left untouched, as is everything outside the quotes.
pub fn rewrite_cue_references(content: &str, replacements: &[(String, String)]) -> String {
    FILE_ENTRY
        .replace_all(content, |caps: &Captures<'_>| {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                return String::new();
            };
            let entry = whole.as_str();
            match replacements
                .iter()
                .find(|(from, _)| from.as_str() == name.as_str().trim())
            {
                Some((_, to)) => {
                    let start = name.start() - whole.start();
                    let end = name.end() - whole.start();
                    format!("{}{}{}", &entry[..start], to, &entry[end..])
                }
                None => entry.to_string(),
            }
        })
        .into_owned()
}

/// Sheet written beside `descriptor` with repaired references.
pub fn repaired_sheet_path(descriptor: &Path) -> PathBuf {
    let stem = descriptor
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    descriptor.with_file_name(format!("{}{}", stem, REPAIRED_SHEET_SUFFIX))
}

pub fn is_repaired_sheet(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_ascii_lowercase()
                .ends_with(REPAIRED_SHEET_SUFFIX)
        })
        .unwrap_or(false)
}

/// Where each referenced data file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiblingResolution {
    /// Resolved siblings in reference order.
    pub found: Vec<PathBuf>,
    /// References satisfied by the repair lookup, with the file actually used.
    pub repaired: Vec<(String, PathBuf)>,
    /// References that could not be located at all.
    pub missing: Vec<String>,
}

/// Resolves references relative to the descriptor, falling back to the repair lookup.
pub fn resolve_siblings(descriptor: &Path, references: &[String]) -> SiblingResolution {
    let dir = descriptor.parent().unwrap_or_else(|| Path::new("."));
    let descriptor_stem = descriptor
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut resolution = SiblingResolution::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for reference in references {
        let direct = dir.join(reference);
        if direct.is_file() && !claimed.contains(&direct) {
            claimed.insert(direct.clone());
            resolution.found.push(direct);
            continue;
        }

        match repair_lookup(&direct, &descriptor_stem, &claimed) {
            Some(repaired) => {
                info!(
                    descriptor = %descriptor.display(),
                    reference = %reference,
                    resolved = %repaired.display(),
                    "Repaired renamed data file reference"
                );
                claimed.insert(repaired.clone());
                resolution.found.push(repaired.clone());
                resolution.repaired.push((reference.clone(), repaired));
            }
            None => {
                warn!(
                    descriptor = %descriptor.display(),
                    reference = %reference,
                    "Referenced data file not found"
                );
                resolution.missing.push(reference.clone());
            }
        }
    }

    resolution
}

fn track_number(text: &str) -> Option<u32> {
    TRACK_TAG
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Looks for a file in the reference's directory whose name matches the cleaned
/// descriptor name, optionally followed by the reference's track tag.
fn repair_lookup(
    missing: &Path,
    descriptor_stem: &str,
    claimed: &HashSet<PathBuf>,
) -> Option<PathBuf> {
    let dir = missing.parent()?;
    let wanted_ext = missing.extension()?.to_string_lossy().to_ascii_lowercase();
    let reference_stem = missing.file_stem()?.to_string_lossy().into_owned();
    let reference_track = track_number(&reference_stem);

    let cleaned_reference = clean_game_name(&reference_stem).to_lowercase();
    let base = clean_game_name(descriptor_stem).to_lowercase();

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && !claimed.contains(path))
        .filter(|path| {
            path.extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase() == wanted_ext)
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    candidates.into_iter().find(|path| {
        let stem = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().to_lowercase(),
            None => return false,
        };
        if stem == cleaned_reference {
            return true;
        }
        let Some(rest) = stem.strip_prefix(&base) else {
            return false;
        };
        let rest = rest.trim();
        match reference_track {
            None => rest.is_empty(),
            Some(track) => {
                rest.starts_with('(')
                    && rest.ends_with(')')
                    && track_number(rest) == Some(track)
            }
        }
    })
}
