//! Batch lifecycle integration tests.
//!
//! These tests drive the dispatcher end to end with a mock converter:
//! - Worker pool bounds and state transitions
//! - Idempotent re-runs and ledger-based resume
//! - Failure, timeout and cancellation accounting
//! - Backup folder handling and output naming across runs
//! - Memory gate holds

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use romcrush_core::{
    config::PostSuccessConfig,
    discovery::{parse_cue_references, repaired_sheet_path},
    executor::{FailureKind, FormatPolicy, JobResult},
    ledger::{JsonFileLedger, ProgressLedger},
    metrics::MEMORY_GATE_HOLDS,
    scheduler::{
        BatchError, BatchObserver, BatchRequest, BatchState, BatchSummary, Dispatcher,
        ProgressUpdate,
    },
    testing::{fixtures, FixedSampler, MockConverter, MockFailure},
    CategorySet, OutputFormat, Platform, ResourceConfig, ResourceMonitor,
};

#[derive(Default)]
struct RecordingObserver {
    states: Mutex<Vec<BatchState>>,
    progress: Mutex<Vec<ProgressUpdate>>,
    finished: Mutex<Vec<String>>,
}

impl BatchObserver for RecordingObserver {
    fn on_state(&self, state: BatchState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_job_finished(&self, result: &JobResult) {
        self.finished
            .lock()
            .unwrap()
            .push(result.outcome.label().to_string());
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        self.progress.lock().unwrap().push(update.clone());
    }
}

/// Test helper holding a source tree, a ledger file and a dispatcher.
struct TestHarness {
    dispatcher: Dispatcher<MockConverter>,
    converter: MockConverter,
    ledger: Arc<JsonFileLedger>,
    observer: Arc<RecordingObserver>,
    source_dir: TempDir,
    _state_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let source_dir = TempDir::new().expect("Failed to create source dir");
        let state_dir = TempDir::new().expect("Failed to create state dir");
        let ledger = Arc::new(JsonFileLedger::open(state_dir.path().join("progress.json")));
        Self::with_ledger(source_dir, state_dir, ledger).await
    }

    async fn with_ledger(
        source_dir: TempDir,
        state_dir: TempDir,
        ledger: Arc<JsonFileLedger>,
    ) -> Self {
        Self::build(source_dir, state_dir, ledger, ResourceMonitor::unavailable()).await
    }

    async fn with_monitor(monitor: ResourceMonitor) -> Self {
        let source_dir = TempDir::new().expect("Failed to create source dir");
        let state_dir = TempDir::new().expect("Failed to create state dir");
        let ledger = Arc::new(JsonFileLedger::open(state_dir.path().join("progress.json")));
        Self::build(source_dir, state_dir, ledger, monitor).await
    }

    async fn build(
        source_dir: TempDir,
        state_dir: TempDir,
        ledger: Arc<JsonFileLedger>,
        monitor: ResourceMonitor,
    ) -> Self {
        let converter = MockConverter::new();
        converter.set_conversion_duration(Duration::from_millis(10)).await;
        let observer = Arc::new(RecordingObserver::default());

        let dispatcher = Dispatcher::new(
            converter.clone(),
            Arc::clone(&ledger) as Arc<dyn ProgressLedger>,
            Arc::new(monitor),
        )
        .with_cores(8)
        .with_observer(Arc::clone(&observer) as Arc<dyn BatchObserver>);

        Self {
            dispatcher,
            converter,
            ledger,
            observer,
            source_dir,
            _state_dir: state_dir,
        }
    }

    fn root(&self) -> &Path {
        self.source_dir.path()
    }

    fn add_games(&self, stems: &[&str]) -> Vec<PathBuf> {
        stems
            .iter()
            .map(|stem| fixtures::cue_game(self.root(), stem))
            .collect()
    }

    fn request(&self, workers: usize) -> BatchRequest {
        BatchRequest::new(self.root()).with_max_workers(workers)
    }

    async fn run(&self, workers: usize) -> BatchSummary {
        self.dispatcher
            .run_batch(self.request(workers))
            .await
            .expect("batch should run")
    }
}

fn assert_accounted(summary: &BatchSummary) {
    assert_eq!(
        summary.success_count
            + summary.failure_count
            + summary.skipped_already_done()
            + summary.cancelled_count,
        summary.total_discovered,
        "every discovered job is accounted for exactly once: {:?}",
        summary
    );
}

#[tokio::test]
async fn test_basic_batch_converts_everything() {
    let harness = TestHarness::new().await;
    harness.add_games(&["Alpha", "Beta", "Gamma"]);

    let summary = harness.run(2).await;

    assert_eq!(summary.total_discovered, 3);
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.workers, 2);
    assert!(summary.is_clean());
    assert!(summary.ledger_cleared);
    assert!(summary.bytes_saved() > 0);
    assert_accounted(&summary);

    for stem in ["Alpha", "Beta", "Gamma"] {
        assert!(harness.root().join(format!("{}.chd", stem)).exists());
        assert!(!harness.root().join(format!("{}.chd.part", stem)).exists());
    }
    assert_eq!(harness.ledger.completed_count(), 0);
    assert_eq!(harness.dispatcher.state(), BatchState::Idle);

    let states = harness.observer.states.lock().unwrap().clone();
    assert_eq!(
        states,
        vec![
            BatchState::Discovering,
            BatchState::Sizing,
            BatchState::Running,
            BatchState::Completing,
            BatchState::Idle,
        ]
    );
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let harness = TestHarness::new().await;
    harness.add_games(&["A", "B", "C", "D"]);

    harness.run(2).await;

    let progress = harness.observer.progress.lock().unwrap().clone();
    assert_eq!(progress.len(), 4);
    for pair in progress.windows(2) {
        assert!(pair[1].completed > pair[0].completed);
        assert!(pair[1].fraction >= pair[0].fraction);
    }
    let last = progress.last().unwrap();
    assert_eq!(last.completed, 4);
    assert_eq!(last.total, 4);
    assert_eq!(last.fraction, 1.0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let harness = TestHarness::new().await;
    harness.add_games(&["Alpha", "Beta", "Gamma"]);

    harness.run(2).await;
    let second = harness.run(2).await;

    assert_eq!(second.success_count, 0);
    assert_eq!(second.skipped_existing, 3);
    assert_eq!(second.skipped_already_done(), 3);
    assert_accounted(&second);
    assert_eq!(harness.converter.conversion_count().await, 3);
}

#[tokio::test]
async fn test_resume_skips_ledger_entries() {
    let harness = TestHarness::new().await;
    let cues = harness.add_games(&["A", "B", "C", "D", "E"]);

    harness.ledger.start_new_batch(harness.root()).unwrap();
    for cue in &cues[..2] {
        let canonical = std::fs::canonicalize(cue).unwrap();
        harness.ledger.mark_completed(&canonical).unwrap();
    }

    let summary = harness.run(2).await;

    assert_eq!(summary.total_discovered, 5);
    assert_eq!(summary.resumed_from_ledger, 2);
    assert_eq!(summary.success_count, 3);
    assert_accounted(&summary);

    let converted: Vec<String> = harness
        .converter
        .recorded_conversions()
        .await
        .iter()
        .map(|c| {
            c.request
                .input_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(converted.len(), 3);
    assert!(!converted.contains(&"A.cue".to_string()));
    assert!(!converted.contains(&"B.cue".to_string()));
}

#[tokio::test]
async fn test_interrupted_batch_resumes_from_reopened_ledger() {
    let source_dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let ledger_path = state_dir.path().join("progress.json");

    let first = TestHarness::with_ledger(
        source_dir,
        state_dir,
        Arc::new(JsonFileLedger::open(&ledger_path)),
    )
    .await;
    first.add_games(&["A", "B", "C"]);
    first.converter.set_failure("C.cue", MockFailure::Exit).await;

    let summary = first.run(1).await;
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert!(!summary.ledger_cleared);
    assert_eq!(first.ledger.completed_count(), 2);

    // A fresh process over the same tree and ledger file.
    let reopened = Arc::new(JsonFileLedger::open(&ledger_path));
    assert_eq!(reopened.completed_count(), 2);
    let TestHarness {
        source_dir,
        _state_dir,
        ..
    } = first;
    let second = TestHarness::with_ledger(source_dir, _state_dir, reopened).await;

    let summary = second.run(1).await;
    assert_eq!(summary.resumed_from_ledger, 2);
    assert_eq!(summary.success_count, 1);
    assert!(summary.ledger_cleared);
    assert_accounted(&summary);

    let recorded = second.converter.recorded_conversions().await;
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].request.input_path.ends_with("C.cue"));
    assert!(second.root().join("C.chd").exists());
}

#[tokio::test]
async fn test_worker_count_bounds_concurrency() {
    let harness = TestHarness::new().await;
    harness.add_games(&["A", "B", "C", "D", "E", "F"]);
    harness
        .converter
        .set_conversion_duration(Duration::from_millis(50))
        .await;

    let summary = harness.run(2).await;

    assert_eq!(summary.success_count, 6);
    assert!(harness.converter.peak_concurrency() <= 2);
    assert!(summary.peak_concurrency <= 2);
    assert!(summary.peak_concurrency >= 1);
}

#[tokio::test]
async fn test_failure_keeps_ledger() {
    let harness = TestHarness::new().await;
    harness.add_games(&["Good", "Bad", "Fine"]);
    harness.converter.set_failure("Bad.cue", MockFailure::Exit).await;

    let summary = harness.run(2).await;

    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert!(!summary.ledger_cleared);
    assert_eq!(harness.ledger.completed_count(), 2);
    assert!(summary.failures[0].descriptor.ends_with("Bad.cue"));
    assert!(summary.failures[0].reason.message.contains("simulated failure"));
    assert!(!harness.root().join("Bad.chd").exists());
    assert_accounted(&summary);
}

#[tokio::test]
async fn test_timeout_is_a_failure() {
    let harness = TestHarness::new().await;
    harness.add_games(&["Slow", "Quick"]);
    harness
        .converter
        .set_failure("Slow.cue", MockFailure::Timeout)
        .await;

    let summary = harness.run(2).await;

    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.failures[0].reason.kind, FailureKind::Timeout);
    let outcomes = harness.observer.finished.lock().unwrap().clone();
    assert!(outcomes.contains(&"timeout".to_string()));
    assert!(outcomes.contains(&"success".to_string()));
}

#[tokio::test]
async fn test_cancel_stops_queued_jobs() {
    let harness = TestHarness::new().await;
    harness.add_games(&["A", "B", "C", "D", "E", "F"]);
    harness
        .converter
        .set_conversion_duration(Duration::from_millis(100))
        .await;

    let token = harness.dispatcher.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
    });

    let summary = harness.run(1).await;

    assert!(summary.was_cancelled());
    assert!(summary.success_count >= 1);
    assert!(summary.cancelled_count >= 1);
    assert!(!summary.ledger_cleared);
    assert_eq!(harness.ledger.completed_count(), summary.success_count);
    assert_accounted(&summary);

    let states = harness.observer.states.lock().unwrap().clone();
    assert!(states.contains(&BatchState::Cancelling));
    assert_eq!(states.last(), Some(&BatchState::Idle));
}

#[tokio::test]
async fn test_next_batch_after_cancel_runs_normally() {
    let harness = TestHarness::new().await;
    harness.add_games(&["A", "B"]);
    harness.dispatcher.cancel();

    // Cancelling while idle has nothing to stop.
    let summary = harness.run(2).await;
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.cancelled_count, 0);
}

#[tokio::test]
async fn test_batch_after_mid_run_cancel_is_unaffected() {
    let harness = TestHarness::new().await;
    harness.add_games(&["A", "B", "C", "D"]);
    harness
        .converter
        .set_conversion_duration(Duration::from_millis(80))
        .await;

    let (first, _) = tokio::join!(harness.run(1), async {
        tokio::time::sleep(Duration::from_millis(120)).await;
        harness.dispatcher.cancel();
    });
    assert!(first.was_cancelled());
    assert!(first.cancelled_count >= 1);

    let second = harness.run(1).await;
    assert!(!second.was_cancelled());
    assert_eq!(second.cancelled_count, 0);
    assert_eq!(second.failure_count, 0);
    assert_eq!(second.total_discovered, 4);
    assert_accounted(&second);
}

#[tokio::test]
async fn test_concurrent_batch_rejected() {
    let harness = TestHarness::new().await;
    harness.add_games(&["A", "B"]);

    let (first, second) = tokio::join!(
        harness.dispatcher.run_batch(harness.request(1)),
        harness.dispatcher.run_batch(harness.request(1)),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(BatchError::AlreadyRunning)));
}

#[tokio::test]
async fn test_move_to_backup_after_conversion() {
    let harness = TestHarness::new().await;
    harness.add_games(&["Game"]);

    let request = harness
        .request(1)
        .with_post_success(PostSuccessConfig::default());
    let summary = harness.dispatcher.run_batch(request).await.unwrap();

    assert_eq!(summary.success_count, 1);
    assert!(harness.root().join("Game.chd").exists());
    assert!(harness.root().join("original_backup/Game.cue").exists());
    assert!(harness.root().join("original_backup/Game.bin").exists());
    assert!(!harness.root().join("Game.cue").exists());
}

#[tokio::test]
async fn test_small_iso_becomes_cso() {
    let harness = TestHarness::new().await;
    fixtures::iso_game(harness.root(), "Handheld.iso");

    // PSP ISOs are opt-in.
    let summary = harness.run(1).await;
    assert_eq!(summary.total_discovered, 0);

    let request = harness.request(1).with_categories(CategorySet::all());
    let summary = harness.dispatcher.run_batch(request).await.unwrap();

    assert_eq!(summary.success_count, 1);
    assert!(harness.root().join("Handheld.cso").exists());
    let recorded = harness.converter.recorded_conversions().await;
    assert_eq!(recorded[0].request.format, OutputFormat::Cso);
}

#[tokio::test]
async fn test_ambiguous_iso_needs_default_platform() {
    let harness = TestHarness::new().await;
    let iso = harness.root().join("Mystery.iso");
    std::fs::File::create(&iso)
        .unwrap()
        .set_len(2_000_000_000)
        .unwrap();

    let summary = harness.run(1).await;
    assert_eq!(summary.failure_count, 1);
    assert_eq!(summary.failures[0].reason.kind, FailureKind::Unclassified);
    assert_eq!(harness.converter.conversion_count().await, 0);

    let request = harness
        .request(1)
        .with_format_policy(FormatPolicy::default().with_unknown_default(Platform::Ps2));
    let summary = harness.dispatcher.run_batch(request).await.unwrap();
    assert_eq!(summary.success_count, 1);
    assert!(harness.root().join("Mystery.chd").exists());
}

#[tokio::test]
async fn test_default_backup_run_is_idempotent() {
    let harness = TestHarness::new().await;
    harness.add_games(&["Alpha", "Beta"]);
    let request = || {
        harness
            .request(2)
            .with_post_success(PostSuccessConfig::default())
    };

    let first = harness.dispatcher.run_batch(request()).await.unwrap();
    assert_eq!(first.success_count, 2);

    let second = harness.dispatcher.run_batch(request()).await.unwrap();
    assert_eq!(second.total_discovered, 0);
    assert_eq!(second.success_count, 0);
    assert_accounted(&second);
    assert_eq!(harness.converter.conversion_count().await, 2);

    let backup = harness.root().join("original_backup");
    assert!(backup.join("Alpha.cue").exists());
    assert!(!backup.join("Alpha.chd").exists());
    assert!(!backup.join("Beta.chd").exists());
    assert!(!backup.join("original_backup").exists());
}

#[tokio::test]
async fn test_image_keeps_suffixed_name_after_sheet_is_backed_up() {
    let harness = TestHarness::new().await;
    let ps2 = harness.root().join("PS2");
    std::fs::create_dir(&ps2).unwrap();
    fixtures::cue_game(&ps2, "Game");
    fixtures::iso_game(&ps2, "Game.iso");
    harness.converter.set_failure("Game.iso", MockFailure::Exit).await;
    let request = || {
        harness
            .request(1)
            .with_post_success(PostSuccessConfig::default())
    };

    let first = harness.dispatcher.run_batch(request()).await.unwrap();
    assert_eq!(first.success_count, 1);
    assert_eq!(first.failure_count, 1);
    assert!(ps2.join("Game.chd").exists());
    assert!(ps2.join("original_backup/Game.cue").exists());

    harness.converter.clear_failures().await;
    let second = harness.dispatcher.run_batch(request()).await.unwrap();

    assert_eq!(second.total_discovered, 1);
    assert_eq!(second.skipped_existing, 0);
    assert_eq!(second.success_count, 1);
    assert!(ps2.join("Game (iso).chd").exists());
    assert!(ps2.join("original_backup/Game.iso").exists());
}

#[tokio::test]
async fn test_repaired_references_reach_the_converter() {
    let harness = TestHarness::new().await;
    let cue = fixtures::cue_with_renamed_track(harness.root(), "Foo (USA)", "Foo (USA).bin", "Foo.bin");

    let summary = harness.run(1).await;

    assert_eq!(summary.success_count, 1);
    let recorded = harness.converter.recorded_conversions().await;
    let sheet = recorded[0]
        .input_snapshot
        .as_deref()
        .expect("converter should receive a CUE sheet");
    let references = parse_cue_references(sheet);
    assert!(!references.is_empty());
    for reference in &references {
        assert!(
            harness.root().join(reference).exists(),
            "converter input references missing file {}",
            reference
        );
    }
    assert!(!repaired_sheet_path(&cue).exists());
    assert!(harness.root().join("Foo (USA).chd").exists());
}

#[tokio::test]
async fn test_critical_memory_holds_job_start() {
    let sampler = FixedSampler::constant(20.0, 99.0);
    let monitor = ResourceMonitor::new(
        Arc::new(sampler.clone()),
        ResourceConfig::default().with_gate_timing(10, 60),
    );
    let harness = TestHarness::with_monitor(monitor).await;
    harness.converter.set_conversion_duration(Duration::ZERO).await;
    harness.add_games(&["Game"]);
    let before = MEMORY_GATE_HOLDS.with_label_values(&["timed_out"]).get();

    let summary = harness.run(1).await;

    assert_eq!(summary.success_count, 1);
    assert!(MEMORY_GATE_HOLDS.with_label_values(&["timed_out"]).get() >= before + 1);
    assert!(sampler.reclaim_hints() >= 1);
    let progress = harness.observer.progress.lock().unwrap();
    let last = progress.last().expect("progress should be reported");
    assert!(
        last.last_job_duration_secs >= 0.06,
        "job start should wait out the gate: {:?}",
        last
    );
}
