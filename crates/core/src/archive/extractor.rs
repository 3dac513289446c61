//! Archive extractor.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::error::ArchiveError;
use super::{extraction_dir, find_archives, ArchiveKind};
use crate::converter::ToolsConfig;
use crate::metrics;

/// What happened to a single archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Extracted(PathBuf),
    /// The target folder already had content.
    AlreadyExtracted(PathBuf),
}

/// Totals for an [`ArchiveExtractor::extract_all`] pass.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub extracted: Vec<PathBuf>,
    pub already_extracted: usize,
    pub deleted_archives: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Unpacks archives natively (zip) or through 7-Zip.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    seven_zip: Option<PathBuf>,
    timeout_secs: u64,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::from_tools(&ToolsConfig::default())
    }
}

impl ArchiveExtractor {
    pub fn new(seven_zip: Option<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            seven_zip,
            timeout_secs,
        }
    }

    pub fn from_tools(tools: &ToolsConfig) -> Self {
        Self::new(tools.seven_zip.clone(), tools.extraction_timeout_secs)
    }

    /// Extracts one archive beside itself.
    pub async fn extract(&self, archive: &Path) -> Result<ExtractOutcome, ArchiveError> {
        if !archive.is_file() {
            return Err(ArchiveError::NotFound {
                path: archive.to_path_buf(),
            });
        }
        let kind = ArchiveKind::detect(archive).ok_or_else(|| ArchiveError::UnsupportedFormat {
            path: archive.to_path_buf(),
        })?;

        let target = extraction_dir(archive);
        if dir_has_entries(&target) {
            debug!(path = %archive.display(), "Target folder not empty, skipping extraction");
            return Ok(ExtractOutcome::AlreadyExtracted(target));
        }

        if kind.needs_seven_zip() {
            let Some(seven_zip) = self.seven_zip.as_deref() else {
                return Err(ArchiveError::ToolNotConfigured {
                    path: archive.to_path_buf(),
                });
            };
            tokio::fs::create_dir_all(&target).await?;
            self.run_seven_zip(seven_zip, archive, &target).await?;
        } else {
            let source = archive.to_path_buf();
            let dest = target.clone();
            tokio::task::spawn_blocking(move || unzip_to_dir(&source, &dest))
                .await
                .map_err(|e| ArchiveError::extraction_failed(archive, e.to_string()))??;
        }

        info!(path = %archive.display(), target = %target.display(), "Extracted archive");
        Ok(ExtractOutcome::Extracted(target))
    }

    async fn run_seven_zip(
        &self,
        program: &Path,
        archive: &Path,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        let child = Command::new(program)
            .arg("x")
            .arg(archive)
            .arg(format!("-o{}", target.display()))
            .arg("-y")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ArchiveError::ToolNotFound {
                        path: program.to_path_buf(),
                    }
                } else {
                    ArchiveError::Io(e)
                }
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(output) => output?,
            Err(_) => {
                warn!(path = %archive.display(), timeout_secs = self.timeout_secs, "Extraction timed out");
                return Err(ArchiveError::Timeout {
                    timeout_secs: self.timeout_secs,
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ArchiveError::extraction_failed(
                archive,
                format!("7-Zip exited with code {:?}: {}", output.status.code(), stderr),
            ))
        }
    }

    /// Extracts every archive under `root`. Failures are logged and counted.
    pub async fn extract_all(
        &self,
        root: &Path,
        recursive: bool,
        delete_after: bool,
    ) -> ExtractionReport {
        let root_owned = root.to_path_buf();
        let archives = tokio::task::spawn_blocking(move || find_archives(&root_owned, recursive))
            .await
            .unwrap_or_default();

        let mut report = ExtractionReport::default();
        if archives.is_empty() {
            debug!(root = %root.display(), "No archives to extract");
            return report;
        }
        info!(count = archives.len(), "Extracting archives");

        for archive in archives {
            match self.extract(&archive).await {
                Ok(ExtractOutcome::Extracted(dir)) => {
                    metrics::EXTRACTIONS_TOTAL
                        .with_label_values(&["extracted"])
                        .inc();
                    report.extracted.push(dir);
                    if delete_after {
                        match tokio::fs::remove_file(&archive).await {
                            Ok(()) => report.deleted_archives += 1,
                            Err(e) => {
                                warn!(path = %archive.display(), error = %e, "Could not delete archive")
                            }
                        }
                    }
                }
                Ok(ExtractOutcome::AlreadyExtracted(_)) => {
                    metrics::EXTRACTIONS_TOTAL
                        .with_label_values(&["skipped"])
                        .inc();
                    report.already_extracted += 1;
                }
                Err(e) => {
                    metrics::EXTRACTIONS_TOTAL
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(path = %archive.display(), error = %e, "Archive extraction failed");
                    report.failed.push((archive, e.to_string()));
                }
            }
        }
        report
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Entries with unsafe names (absolute, `..`) are skipped.
fn unzip_to_dir(zip_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip(e.to_string()))?;
    std::fs::create_dir_all(dest_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Zip(e.to_string()))?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => {
                warn!(entry = entry.name(), "Skipping zip entry with unsafe path");
                continue;
            }
        };
        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}
