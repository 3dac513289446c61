//! Output path planning.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::policy::FormatPolicy;
use crate::discovery::ConversionJob;

/// Output path per descriptor, distinct for every job in the batch.
///
/// Planned over the full sorted discovery result, before ledger filtering,
/// so a resumed batch assigns the same names as the interrupted one.
///
/// A non-CUE image converting to CHD never takes the plain name when a CUE
/// sheet with the same stem sits beside it or in the backup folder. It gets
/// the `(<ext>)` suffix instead, so its output name does not depend on
/// whether the sheet was already converted and moved away.
#[derive(Debug, Clone, Default)]
pub struct OutputPlan {
    outputs: HashMap<PathBuf, PathBuf>,
}

impl OutputPlan {
    pub fn build(
        jobs: &[ConversionJob],
        policy: &FormatPolicy,
        backup_dir_name: Option<&str>,
    ) -> Self {
        let mut outputs = HashMap::with_capacity(jobs.len());
        let mut claimed: HashSet<String> = HashSet::with_capacity(jobs.len());
        let mut sheets = SheetStems::new(backup_dir_name);
        for job in jobs {
            if is_cue(job.descriptor()) {
                sheets.note(job.descriptor());
            }
        }

        for job in jobs {
            let Some(target) = policy.resolve(job.hint()) else {
                continue;
            };
            let descriptor = job.descriptor();
            let extension = target.format.extension();

            let natural = descriptor.with_extension(extension);
            let shadowed = extension == CUE_TARGET_EXTENSION
                && !is_cue(descriptor)
                && sheets.has_sheet_for(descriptor);
            let output = if !shadowed && claimed.insert(claim_key(&natural)) {
                natural
            } else {
                let output = Self::disambiguate(
                    descriptor,
                    &job.source_extension(),
                    extension,
                    &mut claimed,
                );
                debug!(
                    descriptor = %descriptor.display(),
                    output = %output.display(),
                    "Output name taken, using suffixed name"
                );
                output
            };
            outputs.insert(descriptor.to_path_buf(), output);
        }

        Self { outputs }
    }

    fn disambiguate(
        descriptor: &Path,
        source_extension: &str,
        extension: &str,
        claimed: &mut HashSet<String>,
    ) -> PathBuf {
        let stem = descriptor
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let first =
            descriptor.with_file_name(format!("{} ({}).{}", stem, source_extension, extension));
        if claimed.insert(claim_key(&first)) {
            return first;
        }

        let mut n = 2u32;
        loop {
            let candidate = descriptor.with_file_name(format!(
                "{} ({}) {}.{}",
                stem, source_extension, n, extension
            ));
            if claimed.insert(claim_key(&candidate)) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Planned output for a descriptor.
    pub fn output_for(&self, descriptor: &Path) -> Option<&Path> {
        self.outputs.get(descriptor).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// CUE sheets always convert to CHD.
const CUE_TARGET_EXTENSION: &str = "chd";

fn is_cue(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("cue"))
        .unwrap_or(false)
}

fn lower_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Lower-cased CUE stems per directory, from the batch and from disk.
struct SheetStems<'a> {
    backup_dir_name: Option<&'a str>,
    by_dir: HashMap<PathBuf, HashSet<String>>,
}

impl<'a> SheetStems<'a> {
    fn new(backup_dir_name: Option<&'a str>) -> Self {
        Self {
            backup_dir_name,
            by_dir: HashMap::new(),
        }
    }

    fn note(&mut self, sheet: &Path) {
        let dir = sheet.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = lower_stem(sheet);
        self.stems_in(&dir).insert(stem);
    }

    fn has_sheet_for(&mut self, descriptor: &Path) -> bool {
        let dir = descriptor.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = lower_stem(descriptor);
        self.stems_in(&dir).contains(&stem)
    }

    fn stems_in(&mut self, dir: &Path) -> &mut HashSet<String> {
        let backup_dir_name = self.backup_dir_name;
        self.by_dir.entry(dir.to_path_buf()).or_insert_with(|| {
            let mut stems = HashSet::new();
            let mut scan = |dir: &Path| {
                let Ok(entries) = std::fs::read_dir(dir) else {
                    return;
                };
                for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
                    if is_cue(&path) && path.is_file() {
                        stems.insert(lower_stem(&path));
                    }
                }
            };
            scan(dir);
            if let Some(name) = backup_dir_name {
                scan(&dir.join(name));
            }
            stems
        })
    }
}

/// Case-folded so names differing only in case never share a file on
/// case-insensitive filesystems.
fn claim_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DiscMedia, HintSource, Platform, PlatformHint};

    fn cd_job(path: &str) -> ConversionJob {
        ConversionJob::new(
            PathBuf::from(path),
            Vec::new(),
            PlatformHint::resolved(Platform::Ps1, DiscMedia::Cd, HintSource::Extension),
        )
    }

    fn ps2_iso(path: &str) -> ConversionJob {
        ConversionJob::new(
            PathBuf::from(path),
            Vec::new(),
            PlatformHint::resolved(Platform::Ps2, DiscMedia::Dvd, HintSource::Identifier),
        )
    }

    #[test]
    fn test_natural_names() {
        let jobs = vec![cd_job("/r/A.cue"), cd_job("/r/B.cue")];
        let plan = OutputPlan::build(&jobs, &FormatPolicy::default(), None);
        assert_eq!(plan.output_for(Path::new("/r/A.cue")), Some(Path::new("/r/A.chd")));
        assert_eq!(plan.output_for(Path::new("/r/B.cue")), Some(Path::new("/r/B.chd")));
    }

    #[test]
    fn test_collision_gets_source_extension_suffix() {
        let jobs = vec![
            cd_job("/r/Game (iso).cue"),
            cd_job("/r/Game.cue"),
            ps2_iso("/r/Game.iso"),
            ps2_iso("/r/Other.iso"),
            cd_job("/r/other.cue"),
        ];
        let plan = OutputPlan::build(&jobs, &FormatPolicy::default(), None);

        assert_eq!(
            plan.output_for(Path::new("/r/Game (iso).cue")),
            Some(Path::new("/r/Game (iso).chd"))
        );
        assert_eq!(
            plan.output_for(Path::new("/r/Game.cue")),
            Some(Path::new("/r/Game.chd"))
        );
        assert_eq!(
            plan.output_for(Path::new("/r/Game.iso")),
            Some(Path::new("/r/Game (iso) 2.chd"))
        );
        assert_eq!(
            plan.output_for(Path::new("/r/Other.iso")),
            Some(Path::new("/r/Other (iso).chd"))
        );
        assert_eq!(
            plan.output_for(Path::new("/r/other.cue")),
            Some(Path::new("/r/other.chd"))
        );

        let distinct: HashSet<_> = jobs
            .iter()
            .filter_map(|j| plan.output_for(j.descriptor()))
            .collect();
        assert_eq!(distinct.len(), jobs.len());
    }

    #[test]
    fn test_different_formats_do_not_collide() {
        let policy = FormatPolicy {
            ps2_iso: crate::platform::OutputFormat::Zso,
            ..Default::default()
        };
        let jobs = vec![cd_job("/r/Game.cue"), ps2_iso("/r/Game.iso")];
        let plan = OutputPlan::build(&jobs, &policy, None);
        assert_eq!(plan.output_for(Path::new("/r/Game.iso")), Some(Path::new("/r/Game.zso")));
    }

    #[test]
    fn test_image_name_ignores_batch_order() {
        let alone = OutputPlan::build(&[ps2_iso("/r/Game.iso")], &FormatPolicy::default(), None);
        let both = OutputPlan::build(
            &[ps2_iso("/r/Game.iso"), cd_job("/r/GAME.cue")],
            &FormatPolicy::default(),
            None,
        );
        assert_eq!(alone.output_for(Path::new("/r/Game.iso")), Some(Path::new("/r/Game.chd")));
        assert_eq!(
            both.output_for(Path::new("/r/Game.iso")),
            Some(Path::new("/r/Game (iso).chd"))
        );
        assert_eq!(both.output_for(Path::new("/r/GAME.cue")), Some(Path::new("/r/GAME.chd")));
    }

    #[test]
    fn test_backed_up_sheet_still_reserves_plain_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let backup = dir.path().join("original_backup");
        std::fs::create_dir(&backup).unwrap();
        std::fs::write(backup.join("Game.cue"), "FILE \"Game.bin\" BINARY\n").unwrap();
        let iso = dir.path().join("Game.iso");
        std::fs::write(&iso, b"iso").unwrap();
        let jobs = vec![ConversionJob::new(
            iso.clone(),
            Vec::new(),
            PlatformHint::resolved(Platform::Ps2, DiscMedia::Dvd, HintSource::FolderName),
        )];

        let plan = OutputPlan::build(&jobs, &FormatPolicy::default(), Some("original_backup"));
        assert_eq!(plan.output_for(&iso), Some(dir.path().join("Game (iso).chd").as_path()));

        let unaware = OutputPlan::build(&jobs, &FormatPolicy::default(), None);
        assert_eq!(unaware.output_for(&iso), Some(dir.path().join("Game.chd").as_path()));
    }

    #[test]
    fn test_unclassified_jobs_not_planned() {
        let jobs = vec![ConversionJob::new(
            PathBuf::from("/r/Mystery.iso"),
            Vec::new(),
            PlatformHint::Unknown,
        )];
        let plan = OutputPlan::build(&jobs, &FormatPolicy::default(), None);
        assert!(plan.is_empty());
    }
}
