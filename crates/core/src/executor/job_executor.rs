//! Runs a single conversion job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::plan::OutputPlan;
use super::policy::FormatPolicy;
use super::post_action::PostSuccessAction;
use super::result::{FailureKind, FailureReason, JobOutcome, JobResult};
use crate::converter::{ConversionRequest, Converter};
use crate::discovery::{
    parse_cue_references, repaired_sheet_path, rewrite_cue_references, ConversionJob,
};
use crate::metrics;
use crate::resources::{GateOutcome, ResourceMonitor};

/// Executes jobs against one converter.
///
/// Within a job the order is fixed: resolve target, skip if the output is
/// already there, wait at the memory gate, convert into a temporary file,
/// promote it, then run the post-success action.
pub struct JobExecutor<C: Converter> {
    converter: Arc<C>,
    plan: Arc<OutputPlan>,
    post_action: PostSuccessAction,
    monitor: Arc<ResourceMonitor>,
    thread_hint: Option<usize>,
}

impl<C: Converter> JobExecutor<C> {
    pub fn new(
        converter: Arc<C>,
        plan: Arc<OutputPlan>,
        post_action: PostSuccessAction,
        monitor: Arc<ResourceMonitor>,
    ) -> Self {
        Self {
            converter,
            plan,
            post_action,
            monitor,
            thread_hint: None,
        }
    }

    /// Thread count forwarded to converters that accept one.
    pub fn with_thread_hint(mut self, threads: usize) -> Self {
        self.thread_hint = Some(threads.max(1));
        self
    }

    /// Where a job's output goes: the planned name, or the descriptor with
    /// the format's extension when the job was not part of the plan.
    fn output_path(&self, job: &ConversionJob, extension: &str) -> PathBuf {
        self.plan
            .output_for(job.descriptor())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| job.descriptor().with_extension(extension))
    }

    /// In-progress output. Never mistaken for a finished artifact.
    fn partial_path(output: &Path) -> PathBuf {
        let mut name = output
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        output.with_file_name(name)
    }

    /// Input for the converter: the descriptor itself, or a sheet beside it
    /// whose references point at the files discovery actually found.
    async fn converter_input(job: &ConversionJob) -> std::io::Result<(PathBuf, Option<PathBuf>)> {
        let descriptor = job.descriptor();
        if job.repairs().is_empty() {
            return Ok((descriptor.to_path_buf(), None));
        }

        let dir = descriptor.parent().unwrap_or_else(|| Path::new("."));
        let replacements: Vec<(String, String)> = job
            .repairs()
            .iter()
            .map(|(reference, found)| {
                let name = found.strip_prefix(dir).unwrap_or(found);
                (reference.clone(), name.to_string_lossy().into_owned())
            })
            .collect();

        let bytes = tokio::fs::read(descriptor).await?;
        let content = String::from_utf8_lossy(&bytes);
        let repaired = rewrite_cue_references(&content, &replacements);
        let sheet = repaired_sheet_path(descriptor);
        tokio::fs::write(&sheet, repaired.as_bytes()).await?;
        debug!(
            path = %sheet.display(),
            references = parse_cue_references(&repaired).len(),
            "Wrote repaired CUE sheet"
        );
        Ok((sheet.clone(), Some(sheet)))
    }

    pub async fn execute(&self, job: &ConversionJob, policy: &FormatPolicy) -> JobResult {
        let start = Instant::now();
        let descriptor = job.descriptor().to_path_buf();

        let Some(target) = policy.resolve(job.hint()) else {
            warn!(path = %descriptor.display(), "Platform unknown and no default given");
            return JobResult::failed(
                descriptor,
                FailureReason::new(
                    FailureKind::Unclassified,
                    "platform could not be determined and no default platform was given",
                ),
                start.elapsed(),
            );
        };

        let output = self.output_path(job, target.format.extension());
        if output.exists() {
            debug!(path = %descriptor.display(), output = %output.display(), "Output exists, skipping");
            let mut result =
                JobResult::new(descriptor, JobOutcome::SkippedAlreadyDone, start.elapsed());
            result.original_size_bytes = job.original_size_bytes();
            return result;
        }

        match self.monitor.wait_for_memory_headroom().await {
            GateOutcome::Waited(_) => metrics::MEMORY_GATE_HOLDS
                .with_label_values(&["eased"])
                .inc(),
            GateOutcome::TimedOut(_) => metrics::MEMORY_GATE_HOLDS
                .with_label_values(&["timed_out"])
                .inc(),
            GateOutcome::Clear | GateOutcome::Unavailable => {}
        }

        let partial = Self::partial_path(&output);
        if partial.exists() {
            debug!(path = %partial.display(), "Removing stale partial output");
            let _ = tokio::fs::remove_file(&partial).await;
        }

        let (input, repaired_sheet) = match Self::converter_input(job).await {
            Ok(input) => input,
            Err(e) => {
                warn!(path = %descriptor.display(), error = %e, "Could not write repaired CUE sheet");
                return JobResult::failed(
                    descriptor,
                    FailureReason::new(
                        FailureKind::Io,
                        format!("could not write repaired CUE sheet: {}", e),
                    ),
                    start.elapsed(),
                );
            }
        };

        let mut request =
            ConversionRequest::new(input, partial.clone(), target.format, target.media);
        if let Some(threads) = self.thread_hint {
            request = request.with_thread_hint(threads);
        }

        info!(
            path = %descriptor.display(),
            platform = %target.platform,
            format = %target.format,
            "Converting"
        );

        let converted = self.converter.convert(request).await;
        if let Some(sheet) = &repaired_sheet {
            let _ = tokio::fs::remove_file(sheet).await;
        }
        let converted = match converted {
            Ok(converted) => converted,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                let reason = FailureReason::from_converter(&e);
                warn!(path = %descriptor.display(), error = %reason, "Conversion failed");
                return JobResult::failed(descriptor, reason, start.elapsed());
            }
        };

        if converted.output_size_bytes == 0 {
            let _ = tokio::fs::remove_file(&partial).await;
            return JobResult::failed(
                descriptor,
                FailureReason::new(FailureKind::Execution, "converter produced an empty file"),
                start.elapsed(),
            );
        }

        if let Err(e) = tokio::fs::rename(&partial, &output).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return JobResult::failed(
                descriptor,
                FailureReason::new(
                    FailureKind::Io,
                    format!("could not move output into place: {}", e),
                ),
                start.elapsed(),
            );
        }

        let original_size = job.original_size_bytes();
        if let Err(e) = self.post_action.apply(job).await {
            warn!(path = %descriptor.display(), error = %e, "Post-success action failed");
        }

        info!(
            path = %descriptor.display(),
            output = %output.display(),
            original_bytes = original_size,
            output_bytes = converted.output_size_bytes,
            "Converted"
        );
        JobResult::success(
            descriptor,
            output,
            converted.output_size_bytes,
            original_size,
            start.elapsed(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DiscMedia, HintSource, OutputFormat, Platform, PlatformHint};
    use crate::testing::{fixtures, MockConverter, MockFailure};
    use tempfile::TempDir;

    fn executor(converter: &MockConverter, action: PostSuccessAction) -> JobExecutor<MockConverter> {
        JobExecutor::new(
            Arc::new(converter.clone()),
            Arc::new(OutputPlan::default()),
            action,
            Arc::new(ResourceMonitor::unavailable()),
        )
    }

    fn cue_job(dir: &Path, stem: &str) -> ConversionJob {
        let cue = fixtures::cue_game(dir, stem);
        let bin = dir.join(format!("{}.bin", stem));
        ConversionJob::new(
            cue,
            vec![bin],
            PlatformHint::resolved(Platform::Ps1, DiscMedia::Cd, HintSource::Extension),
        )
    }

    #[tokio::test]
    async fn test_success_promotes_output() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        let job = cue_job(dir.path(), "Game");

        let result = executor(&converter, PostSuccessAction::LeaveInPlace)
            .with_thread_hint(2)
            .execute(&job, &FormatPolicy::default())
            .await;

        assert_eq!(result.outcome, JobOutcome::Success);
        let output = dir.path().join("Game.chd");
        assert_eq!(result.output_path.as_deref(), Some(output.as_path()));
        assert!(output.exists());
        assert!(!dir.path().join("Game.chd.part").exists());
        assert!(result.bytes_saved().unwrap() > 0);

        let recorded = converter.recorded_conversions().await;
        assert_eq!(recorded[0].request.format, OutputFormat::Chd);
        assert_eq!(recorded[0].request.thread_hint, Some(2));
        assert!(recorded[0].request.output_path.ends_with("Game.chd.part"));
    }

    #[tokio::test]
    async fn test_existing_output_skips_tool() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        let job = cue_job(dir.path(), "Game");
        std::fs::write(dir.path().join("Game.chd"), b"done").unwrap();

        let result = executor(&converter, PostSuccessAction::DeleteOriginals)
            .execute(&job, &FormatPolicy::default())
            .await;

        assert_eq!(result.outcome, JobOutcome::SkippedAlreadyDone);
        assert_eq!(converter.conversion_count().await, 0);
        assert!(job.descriptor().exists());
    }

    #[tokio::test]
    async fn test_failure_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_failure("Game.cue", MockFailure::Exit).await;
        let job = cue_job(dir.path(), "Game");

        let result = executor(&converter, PostSuccessAction::DeleteOriginals)
            .execute(&job, &FormatPolicy::default())
            .await;

        match &result.outcome {
            JobOutcome::Failed(reason) => {
                assert_eq!(reason.kind, FailureKind::Execution);
                assert!(reason.message.contains("simulated failure"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!dir.path().join("Game.chd").exists());
        assert!(job.descriptor().exists());
    }

    #[tokio::test]
    async fn test_timeout_reported_as_timeout() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_failure("Game.cue", MockFailure::Timeout).await;
        let job = cue_job(dir.path(), "Game");

        let result = executor(&converter, PostSuccessAction::LeaveInPlace)
            .execute(&job, &FormatPolicy::default())
            .await;
        assert_eq!(result.outcome.label(), "timeout");
    }

    #[tokio::test]
    async fn test_unknown_without_default_fails_unclassified() {
        let dir = TempDir::new().unwrap();
        let iso = fixtures::iso_game(dir.path(), "Mystery.iso");
        let job = ConversionJob::new(iso, Vec::new(), PlatformHint::Unknown);
        let converter = MockConverter::new();

        let result = executor(&converter, PostSuccessAction::LeaveInPlace)
            .execute(&job, &FormatPolicy::default())
            .await;
        assert!(matches!(
            result.outcome,
            JobOutcome::Failed(FailureReason {
                kind: FailureKind::Unclassified,
                ..
            })
        ));

        let result = executor(&converter, PostSuccessAction::LeaveInPlace)
            .execute(&job, &FormatPolicy::default().with_unknown_default(Platform::Ps2))
            .await;
        assert_eq!(result.outcome, JobOutcome::Success);
        assert!(dir.path().join("Mystery.chd").exists());
    }

    #[tokio::test]
    async fn test_move_to_backup_after_success() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        let job = cue_job(dir.path(), "Game");

        let result = executor(
            &converter,
            PostSuccessAction::MoveToBackup {
                dir_name: "original_backup".to_string(),
            },
        )
        .execute(&job, &FormatPolicy::default())
        .await;

        assert_eq!(result.outcome, JobOutcome::Success);
        assert!(dir.path().join("original_backup/Game.cue").exists());
        assert!(dir.path().join("original_backup/Game.bin").exists());
        assert!(dir.path().join("Game.chd").exists());
    }

    #[tokio::test]
    async fn test_converter_sees_repaired_references() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        let cue = fixtures::cue_with_renamed_track(dir.path(), "Foo (USA)", "Foo (USA).bin", "Foo.bin");
        let bin = dir.path().join("Foo.bin");
        let job = ConversionJob::new(
            cue.clone(),
            vec![bin.clone()],
            PlatformHint::resolved(Platform::Ps1, DiscMedia::Cd, HintSource::Extension),
        )
        .with_repairs(vec![("Foo (USA).bin".to_string(), bin)]);

        let result = executor(&converter, PostSuccessAction::LeaveInPlace)
            .execute(&job, &FormatPolicy::default())
            .await;
        assert_eq!(result.outcome, JobOutcome::Success);

        let conversions = converter.recorded_conversions().await;
        let sheet = conversions[0].input_snapshot.clone().unwrap();
        let references = parse_cue_references(&sheet);
        assert_eq!(references, vec!["Foo.bin".to_string()]);
        for reference in references {
            assert!(dir.path().join(reference).exists());
        }

        assert!(!repaired_sheet_path(&cue).exists());
        assert!(std::fs::read_to_string(&cue).unwrap().contains("Foo (USA).bin"));
        assert!(dir.path().join("Foo (USA).chd").exists());
    }

    #[tokio::test]
    async fn test_repaired_sheet_removed_after_failure() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_failure("Foo (USA).repaired.cue", MockFailure::Exit).await;
        let cue = fixtures::cue_with_renamed_track(dir.path(), "Foo (USA)", "Foo (USA).bin", "Foo.bin");
        let bin = dir.path().join("Foo.bin");
        let job = ConversionJob::new(
            cue.clone(),
            vec![bin.clone()],
            PlatformHint::resolved(Platform::Ps1, DiscMedia::Cd, HintSource::Extension),
        )
        .with_repairs(vec![("Foo (USA).bin".to_string(), bin)]);

        let result = executor(&converter, PostSuccessAction::LeaveInPlace)
            .execute(&job, &FormatPolicy::default())
            .await;

        assert_eq!(result.outcome.label(), "failed");
        assert!(!repaired_sheet_path(&cue).exists());
        assert!(!dir.path().join("Foo (USA).chd").exists());
    }
}
