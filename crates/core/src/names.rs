//! Game filename normalization.
//!
//! Two cleaners are provided:
//!
//! - [`clean_game_name`] drops region, language, revision and dump tags while
//!   keeping the tags that tell discs and editions apart. Used for renames and
//!   for locating data files whose names were cleaned independently of their
//!   descriptor.
//! - [`strip_tags`] removes every parenthetical and bracketed tag except the
//!   disc number. Used when relocating converted images into a flat library.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::discovery::rewrite_cue_references;

/// Extensions considered ROM files by the rename pass.
pub const ROM_EXTENSIONS: &[&str] = &[
    "chd", "cue", "bin", "iso", "img", "cso", "zso", "gba", "gbc", "gb", "nes", "snes", "sfc",
    "smc", "n64", "z64", "v64", "nds", "3ds", "cia", "psx", "pbp", "gcm", "gcz", "rvz", "wbfs",
    "wad", "xci", "nsp", "xiso",
];

const KEEP_PATTERNS: &[&str] = &[
    r"\(Disc\s*\d+\)",
    r"\(Disk\s*\d+\)",
    r"\(Bonus\s*Dis[ck]\)",
    r"\(Custom\s*Install\s*Disc\)",
    r"\(Install\s*Disc\)",
    r"\(Demo\)",
    r"\(Beta\)",
    r"\(Proto\)",
    r"\(Prototype\)",
    r"\(Sample\)",
    r"\(Promo\)",
    r"\(Kiosk\)",
    r"\(Limited\s*Edition\)",
    r"\(Collector.?s?\s*Edition\)",
    r"\(Special\s*Edition\)",
    r"\(Game\s*of.*Year\)",
    r"\(GOTY\)",
    r"\(Director.?s?\s*Cut\)",
    r"\(Uncut\)",
    r"\(Black\s*Label\)",
    r"\(Greatest\s*Hits\)",
    r"\(Platinum\)",
    r"\(Player.?s?\s*Choice\)",
    r"\(Nintendo\s*Selects\)",
    r"\(Budget\)",
    r"\(Reprint\)",
    r"\(Alt\)",
    r"\(Part\s*\d+\)",
    r"\(Side\s*[AB]\)",
    r"\(Track\s*\d+\)",
];

const REMOVE_PATTERNS: &[&str] = &[
    // Regions
    r"\((?:USA|U|America|Europe|E|EU|Japan|J|JP|Korea|K|KR|Asia|A|World|W|Australia|AU)\)",
    r"\((?:France|F|Fr|Germany|G|De|Spain|S|Es|Italy|I|It|Netherlands|Nl)\)",
    r"\((?:Sweden|Sw|Sv|Norway|No|Denmark|Dk|Da|Finland|Fi|Portugal|Pt|Brazil|Br)\)",
    r"\((?:Russia|Ru|China|Cn|Zh|Taiwan|Tw|Hong\s*Kong|HK)\)",
    // Languages
    r"\(En\)",
    r"\(En,.*?\)",
    r"\((?:English|French|German|Spanish|Italian|Japanese)\)",
    r"\(Multi\d*\)",
    r"\(M\d+\)",
    // Revisions
    r"\(Rev\s*[\dA-Z\.]+\)",
    r"\(v[\d\.]+[a-z]?\)",
    r"\(Ver\.?\s*[\d\.]+\)",
    r"\(Version\s*[\d\.]+\)",
    // Dump flags
    r"\[!\]",
    r"\[a\d?\]",
    r"\[b\d?\]",
    r"\[c\]",
    r"\[f\d?\]",
    r"\[h\d*[A-Za-z]*\]",
    r"\[o\d?\]",
    r"\[p\d?\]",
    r"\[t\d?\]",
    r"\[T[+-][A-Za-z]+[^\]]*\]",
    // Video standards
    r"\((?:NTSC|NTSC-U|NTSC-J|PAL|SECAM)\)",
    // Date stamps
    r"\(\d{4}-\d{2}-\d{2}\)",
    r"\(\d{8}\)",
    r"\(Unl\)",
];

const REGION_WORDS: &[&str] = &[
    "USA", "Europe", "Japan", "Asia", "World", "Korea", "Australia", "France", "Germany", "Spain",
    "Italy", "Netherlands", "Sweden", "Norway", "Denmark", "Finland", "Portugal", "Brazil",
    "Russia", "China", "Taiwan", "Hong Kong", "Canada", "UK", "America", "En", "Fr", "De", "Es",
    "It", "Ja", "Ko", "Zh", "Pt", "Ru", "Nl", "English", "French", "German", "Spanish", "Italian",
    "Japanese", "U", "E", "J", "A", "K", "W", "G", "F", "S", "I", "EU", "JP", "KR", "AU", "Br",
    "Cn", "Tw", "HK", "Dk", "Fi", "No", "Sv", "Sw",
];

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).unwrap()
}

static KEEP: Lazy<Vec<Regex>> = Lazy::new(|| {
    KEEP_PATTERNS
        .iter()
        .map(|p| compile(&format!("^{}$", p)))
        .collect()
});

static REMOVE: Lazy<Vec<Regex>> = Lazy::new(|| REMOVE_PATTERNS.iter().map(|p| compile(p)).collect());

static MULTI_REGION: Lazy<Regex> = Lazy::new(|| {
    let words = REGION_WORDS
        .iter()
        .map(|w| regex_lite::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    compile(&format!(r"\(\s*(?:{words})(?:\s*,\s*(?:{words}))+\s*\)"))
});

static SHORT_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([A-Za-z]{1,3}\)").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static VERSION_TAG: Lazy<Regex> = Lazy::new(|| compile(r"\s*\(V[\d.]+\)"));
static ANY_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]+\)").unwrap());
static ANY_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]+\]").unwrap());
static DISC_TAG: Lazy<Regex> = Lazy::new(|| compile(r"\(Disc\s*\d+\)"));

fn is_kept_tag(tag: &str) -> bool {
    KEEP.iter().any(|re| re.is_match(tag))
}

fn collapse_whitespace(name: &str) -> String {
    WHITESPACE.replace_all(name, " ").trim().to_string()
}

/// Cleans a game name (without extension).
///
/// Idempotent: cleaning an already clean name returns it unchanged.
pub fn clean_game_name(name: &str) -> String {
    let mut cleaned = MULTI_REGION.replace_all(name, "").into_owned();

    for re in REMOVE.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }

    // Short codes that survived the explicit list, unless they are protected tags.
    cleaned = SHORT_CODE
        .replace_all(&cleaned, |caps: &Captures| {
            let whole = &caps[0];
            if is_kept_tag(whole.trim()) {
                whole.to_string()
            } else {
                String::new()
            }
        })
        .into_owned();

    collapse_whitespace(&cleaned)
}

/// Removes all tags except the disc number, which is re-appended at the end.
pub fn strip_tags(name: &str) -> String {
    let disc = DISC_TAG.find(name).map(|m| m.as_str().to_string());

    let stripped = VERSION_TAG.replace_all(name, "");
    let stripped = ANY_PAREN.replace_all(&stripped, "");
    let stripped = ANY_BRACKET.replace_all(&stripped, "");
    let stripped = collapse_whitespace(&stripped);

    match disc {
        Some(tag) => format!("{} {}", stripped, tag),
        None => stripped,
    }
}

/// Cleans a full file name, preserving its extension.
pub fn clean_file_name(file_name: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned = clean_game_name(&stem);
    match path.extension() {
        Some(ext) => format!("{}.{}", cleaned, ext.to_string_lossy()),
        None => cleaned,
    }
}

/// A single planned rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Outcome of applying a rename plan.
#[derive(Debug, Clone, Default)]
pub struct RenameReport {
    pub renamed: usize,
    pub skipped_existing: usize,
    pub failed: Vec<(PathBuf, String)>,
    /// CUE sheets whose `FILE` references were updated to renamed files.
    pub rewritten_sheets: usize,
}

/// Lists the ROM files under `root` whose cleaned name differs from the current one.
pub fn plan_renames(root: &Path, recursive: bool) -> Vec<RenamePlan> {
    let depth = if recursive { usize::MAX } else { 1 };
    let mut plans: Vec<RenamePlan> = WalkDir::new(root)
        .max_depth(depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), ROM_EXTENSIONS))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let cleaned = clean_file_name(&name);
            if cleaned == name || cleaned.starts_with('.') {
                return None;
            }
            Some(RenamePlan {
                from: entry.path().to_path_buf(),
                to: entry.path().with_file_name(cleaned),
            })
        })
        .collect();
    plans.sort_by(|a, b| a.from.cmp(&b.from));
    plans
}

/// Applies renames. An existing target is never overwritten.
///
/// Sheets in a directory where files were renamed are rewritten to reference
/// the new names, so a renamed track stays reachable from its CUE.
pub fn apply_renames(plans: &[RenamePlan]) -> RenameReport {
    let mut report = RenameReport::default();
    let mut renamed_by_dir: BTreeMap<PathBuf, Vec<(String, String)>> = BTreeMap::new();
    for plan in plans {
        if plan.to.exists() {
            debug!(target = %plan.to.display(), "Rename target exists, skipping");
            report.skipped_existing += 1;
            continue;
        }
        match std::fs::rename(&plan.from, &plan.to) {
            Ok(()) => {
                info!(from = %plan.from.display(), to = %plan.to.display(), "Renamed");
                report.renamed += 1;
                if let (Some(dir), Some(from), Some(to)) =
                    (plan.from.parent(), plan.from.file_name(), plan.to.file_name())
                {
                    renamed_by_dir.entry(dir.to_path_buf()).or_default().push((
                        from.to_string_lossy().into_owned(),
                        to.to_string_lossy().into_owned(),
                    ));
                }
            }
            Err(e) => {
                warn!(path = %plan.from.display(), error = %e, "Rename failed");
                report.failed.push((plan.from.clone(), e.to_string()));
            }
        }
    }

    for (dir, replacements) in &renamed_by_dir {
        report.rewritten_sheets += rewrite_sheets_in(dir, replacements, &mut report.failed);
    }
    report
}

fn rewrite_sheets_in(
    dir: &Path,
    replacements: &[(String, String)],
    failed: &mut Vec<(PathBuf, String)>,
) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Could not list renamed directory");
            return 0;
        }
    };

    let mut rewritten = 0;
    for sheet in entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file() && has_extension(path, &["cue"]))
    {
        let content = match std::fs::read(&sheet) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                failed.push((sheet, e.to_string()));
                continue;
            }
        };
        let updated = rewrite_cue_references(&content, replacements);
        if updated == content {
            continue;
        }
        match std::fs::write(&sheet, updated) {
            Ok(()) => {
                debug!(sheet = %sheet.display(), "Updated CUE references");
                rewritten += 1;
            }
            Err(e) => {
                warn!(sheet = %sheet.display(), error = %e, "Could not update CUE references");
                failed.push((sheet, e.to_string()));
            }
        }
    }
    rewritten
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_removes_region_and_language() {
        assert_eq!(clean_game_name("Foo (USA)"), "Foo");
        assert_eq!(clean_game_name("Bar (Europe) (En,Fr,De)"), "Bar");
        assert_eq!(clean_game_name("Baz (USA, Europe)"), "Baz");
    }

    #[test]
    fn test_removes_revision_and_dump_flags() {
        assert_eq!(clean_game_name("Game (Rev 1) [!]"), "Game");
        assert_eq!(clean_game_name("Game (v1.1) [b1]"), "Game");
        assert_eq!(clean_game_name("Game (NTSC-U) (2001-12-25)"), "Game");
    }

    #[test]
    fn test_keeps_disc_and_edition_tags() {
        assert_eq!(
            clean_game_name("Final Quest (USA) (Disc 2)"),
            "Final Quest (Disc 2)"
        );
        assert_eq!(
            clean_game_name("Racer (Japan) (Greatest Hits)"),
            "Racer (Greatest Hits)"
        );
        assert_eq!(clean_game_name("Racer (Alt) (U)"), "Racer (Alt)");
    }

    #[test]
    fn test_keeps_track_indicator() {
        assert_eq!(
            clean_game_name("Foo (USA) (Track 01)"),
            "Foo (Track 01)"
        );
    }

    #[test]
    fn test_clean_is_idempotent() {
        let once = clean_game_name("Thing (Europe) (Rev A) (Disc 1) [!]");
        assert_eq!(clean_game_name(&once), once);
    }

    #[test]
    fn test_clean_file_name_keeps_extension() {
        assert_eq!(clean_file_name("Foo (USA).bin"), "Foo.bin");
        assert_eq!(clean_file_name("Foo.cue"), "Foo.cue");
    }

    #[test]
    fn test_strip_tags_keeps_only_disc() {
        assert_eq!(
            strip_tags("Saga (USA) (Disc 2) (Greatest Hits) [!]"),
            "Saga (Disc 2)"
        );
        assert_eq!(strip_tags("Plain (V1.01) (Beta)"), "Plain");
    }

    #[test]
    fn test_plan_and_apply_renames() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Foo (USA).iso"), b"x").unwrap();
        std::fs::write(dir.path().join("Bar (Europe).iso"), b"x").unwrap();
        std::fs::write(dir.path().join("Bar.iso"), b"existing").unwrap();
        std::fs::write(dir.path().join("notes (USA).txt"), b"x").unwrap();

        let plans = plan_renames(dir.path(), false);
        assert_eq!(plans.len(), 2);

        let report = apply_renames(&plans);
        assert_eq!(report.renamed, 1);
        assert_eq!(report.skipped_existing, 1);
        assert!(dir.path().join("Foo.iso").exists());
        assert!(dir.path().join("Bar (Europe).iso").exists());
        assert_eq!(std::fs::read(dir.path().join("Bar.iso")).unwrap(), b"existing");
    }

    #[test]
    fn test_renamed_tracks_stay_referenced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Foo (USA).cue"),
            "FILE \"Foo (USA) (Track 1).bin\" BINARY\n  TRACK 01 MODE2/2352\n\
             FILE \"Foo (USA) (Track 2).bin\" BINARY\n  TRACK 02 AUDIO\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("Foo (USA) (Track 1).bin"), b"x").unwrap();
        std::fs::write(dir.path().join("Foo (USA) (Track 2).bin"), b"x").unwrap();

        let report = apply_renames(&plan_renames(dir.path(), false));
        assert_eq!(report.renamed, 3);
        assert_eq!(report.rewritten_sheets, 1);
        assert!(report.failed.is_empty());

        let sheet = std::fs::read_to_string(dir.path().join("Foo.cue")).unwrap();
        let references = crate::discovery::parse_cue_references(&sheet);
        assert_eq!(references, vec!["Foo (Track 1).bin", "Foo (Track 2).bin"]);
        for reference in references {
            assert!(dir.path().join(reference).exists());
        }
    }
}
