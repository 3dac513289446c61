//! What happens to the sources after a successful conversion.

use std::path::Path;
use tracing::{debug, info};

use crate::config::{ConfigError, PostSuccessConfig};
use crate::discovery::ConversionJob;
use crate::relocate::{move_to_backup, RelocateError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostSuccessAction {
    LeaveInPlace,
    /// Move descriptor and siblings into a folder of this name beside the descriptor.
    MoveToBackup { dir_name: String },
    DeleteOriginals,
}

impl PostSuccessAction {
    /// Builds the action, rejecting mutually exclusive options.
    pub fn from_config(config: &PostSuccessConfig) -> Result<Self, ConfigError> {
        match (config.move_to_backup, config.delete_originals) {
            (true, true) => Err(ConfigError::ValidationError(
                "move_to_backup and delete_originals cannot both be selected".to_string(),
            )),
            (true, false) => {
                let dir_name = config.backup_dir_name.trim();
                if dir_name.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "backup_dir_name cannot be empty".to_string(),
                    ));
                }
                Ok(Self::MoveToBackup {
                    dir_name: dir_name.to_string(),
                })
            }
            (false, true) => Ok(Self::DeleteOriginals),
            (false, false) => Ok(Self::LeaveInPlace),
        }
    }

    pub async fn apply(&self, job: &ConversionJob) -> Result<(), RelocateError> {
        match self {
            Self::LeaveInPlace => Ok(()),
            Self::MoveToBackup { dir_name } => {
                let parent = job.descriptor().parent().unwrap_or_else(|| Path::new("."));
                let backup_dir = parent.join(dir_name);
                let files: Vec<_> = job.all_files().map(Path::to_path_buf).collect();
                let moved = move_to_backup(&files, &backup_dir).await?;
                info!(
                    descriptor = %job.descriptor().display(),
                    backup = %backup_dir.display(),
                    files = moved.len(),
                    "Moved originals to backup"
                );
                Ok(())
            }
            Self::DeleteOriginals => {
                for file in job.all_files() {
                    match tokio::fs::remove_file(file).await {
                        Ok(()) => debug!(path = %file.display(), "Deleted original"),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(RelocateError::RemoveFailed {
                                path: file.to_path_buf(),
                                source: e,
                            })
                        }
                    }
                }
                info!(descriptor = %job.descriptor().display(), "Deleted originals");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformHint;
    use tempfile::TempDir;

    fn job_with_files(dir: &Path) -> ConversionJob {
        let cue = dir.join("Game.cue");
        let bin = dir.join("Game.bin");
        std::fs::write(&cue, b"FILE \"Game.bin\" BINARY\n").unwrap();
        std::fs::write(&bin, vec![0u8; 16]).unwrap();
        ConversionJob::new(cue, vec![bin], PlatformHint::Unknown)
    }

    #[test]
    fn test_from_config_exclusive() {
        let mut config = PostSuccessConfig::default();
        assert_eq!(
            PostSuccessAction::from_config(&config).unwrap(),
            PostSuccessAction::MoveToBackup {
                dir_name: "original_backup".to_string()
            }
        );

        config.delete_originals = true;
        assert!(PostSuccessAction::from_config(&config).is_err());

        config.move_to_backup = false;
        assert_eq!(
            PostSuccessAction::from_config(&config).unwrap(),
            PostSuccessAction::DeleteOriginals
        );
        assert_eq!(
            PostSuccessAction::from_config(&PostSuccessConfig::leave_in_place()).unwrap(),
            PostSuccessAction::LeaveInPlace
        );
    }

    #[tokio::test]
    async fn test_move_to_backup() {
        let dir = TempDir::new().unwrap();
        let job = job_with_files(dir.path());
        PostSuccessAction::MoveToBackup {
            dir_name: "original_backup".to_string(),
        }
        .apply(&job)
        .await
        .unwrap();

        assert!(!job.descriptor().exists());
        assert!(dir.path().join("original_backup/Game.cue").exists());
        assert!(dir.path().join("original_backup/Game.bin").exists());
    }

    #[tokio::test]
    async fn test_delete_originals() {
        let dir = TempDir::new().unwrap();
        let job = job_with_files(dir.path());
        PostSuccessAction::DeleteOriginals.apply(&job).await.unwrap();
        assert!(job.all_files().all(|p| !p.exists()));
    }
}
