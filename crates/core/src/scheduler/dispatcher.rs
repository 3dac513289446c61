//! Bounded-concurrency batch dispatcher.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::BatchError;
use super::observer::BatchObserver;
use super::stats::AggregateStats;
use super::types::{BatchRequest, BatchState, BatchSummary, FailedJob};
use crate::archive::ArchiveExtractor;
use crate::converter::Converter;
use crate::discovery::{ConversionJob, DiscoveryError, DiscoveryRequest, WorkDiscovery};
use crate::executor::{
    FailureKind, FailureReason, FormatPolicy, JobExecutor, JobOutcome, JobResult, OutputPlan,
    PostSuccessAction,
};
use crate::ledger::ProgressLedger;
use crate::metrics;
use crate::resources::{PressureLevel, ResourceMonitor};

/// Live pool counters, readable while a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub workers: usize,
    pub active_jobs: usize,
    pub queued_jobs: usize,
    pub peak_active: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

#[derive(Default)]
struct PoolStats {
    workers: AtomicU64,
    active: AtomicU64,
    queued: AtomicU64,
    peak: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

impl PoolStats {
    fn reset(&self, workers: usize, queued: usize) {
        self.workers.store(workers as u64, Ordering::Relaxed);
        self.active.store(0, Ordering::Relaxed);
        self.queued.store(queued as u64, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
        self.total_processed.store(0, Ordering::Relaxed);
        self.total_failed.store(0, Ordering::Relaxed);
    }

    fn dequeue(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |q| q.checked_sub(1));
    }

    fn start(&self) {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
    }

    fn finish(&self, failed: bool) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn to_status(&self) -> PoolStatus {
        PoolStatus {
            workers: self.workers.load(Ordering::Relaxed) as usize,
            active_jobs: self.active.load(Ordering::Relaxed) as usize,
            queued_jobs: self.queued.load(Ordering::Relaxed) as usize,
            peak_active: self.peak.load(Ordering::Relaxed) as usize,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Returns the dispatcher to `Idle` even if the batch future is dropped.
struct IdleGuard(Arc<Mutex<BatchState>>);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = BatchState::Idle;
    }
}

/// Runs batches of conversion jobs on a bounded worker pool.
///
/// One batch at a time. The pool size is fixed when the batch starts; the
/// periodic resource check only reports pressure. Completed jobs are written
/// to the ledger before they count toward progress, so an interrupted batch
/// resumes where it stopped.
pub struct Dispatcher<C: Converter> {
    converter: Arc<C>,
    ledger: Arc<dyn ProgressLedger>,
    monitor: Arc<ResourceMonitor>,
    discovery: WorkDiscovery,
    extractor: ArchiveExtractor,
    observers: Vec<Arc<dyn BatchObserver>>,
    state: Arc<Mutex<BatchState>>,
    pool: Arc<PoolStats>,
    shutdown: CancellationToken,
    batch_cancel: Mutex<Option<CancellationToken>>,
    resource_check_interval: Duration,
    cores: usize,
}

impl<C: Converter + 'static> Dispatcher<C> {
    pub fn new(
        converter: C,
        ledger: Arc<dyn ProgressLedger>,
        monitor: Arc<ResourceMonitor>,
    ) -> Self {
        Self {
            converter: Arc::new(converter),
            ledger,
            monitor,
            discovery: WorkDiscovery::default(),
            extractor: ArchiveExtractor::default(),
            observers: Vec::new(),
            state: Arc::new(Mutex::new(BatchState::Idle)),
            pool: Arc::new(PoolStats::default()),
            shutdown: CancellationToken::new(),
            batch_cancel: Mutex::new(None),
            resource_check_interval: Duration::from_secs(5),
            cores: ResourceMonitor::available_cores(),
        }
    }

    pub fn with_discovery(mut self, discovery: WorkDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_resource_check_interval(mut self, interval: Duration) -> Self {
        self.resource_check_interval = interval.max(Duration::from_millis(10));
        self
    }

    /// Overrides the detected core count used for sizing and thread hints.
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn state(&self) -> BatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.to_status()
    }

    /// Parent of every batch's token. Cancelling it stops the running batch
    /// and every batch started afterwards, so it can be handed to a signal
    /// handler before `run_batch` is called.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels the running batch, if any. Later batches are unaffected.
    pub fn cancel(&self) {
        if let Some(token) = self
            .batch_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            token.cancel();
        }
    }

    fn set_state(&self, state: BatchState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        debug!(state = %state, "Batch state changed");
        for observer in &self.observers {
            observer.on_state(state);
        }
    }

    /// Checks everything that must hold before any job runs.
    fn validate(
        &self,
        request: &BatchRequest,
    ) -> Result<(FormatPolicy, PostSuccessAction), BatchError> {
        if request.categories.is_empty() {
            return Err(BatchError::configuration("no categories selected"));
        }
        if request.max_workers == 0 {
            return Err(BatchError::configuration("max_workers must be at least 1"));
        }
        let post_action = PostSuccessAction::from_config(&request.post_success)?;
        let policy = request
            .format_policy
            .reconcile(&request.categories, |format| self.converter.supports(format))?;
        Ok((policy, post_action))
    }

    /// Runs one batch to completion or cancellation.
    pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchSummary, BatchError> {
        let (policy, post_action) = self.validate(&request)?;

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != BatchState::Idle {
                return Err(BatchError::AlreadyRunning);
            }
            *state = BatchState::Discovering;
        }
        let _idle = IdleGuard(self.state.clone());
        let cancel = self.shutdown.child_token();
        *self
            .batch_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

        let result = self.run(request, policy, post_action, cancel).await;
        self.batch_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(BatchState::Idle);
        result
    }

    async fn run(
        &self,
        request: BatchRequest,
        policy: FormatPolicy,
        post_action: PostSuccessAction,
        cancel: CancellationToken,
    ) -> Result<BatchSummary, BatchError> {
        let started = Instant::now();
        self.set_state(BatchState::Discovering);

        if request.extract_archives {
            let report = self
                .extractor
                .extract_all(&request.root, request.recursive, request.delete_archives)
                .await;
            info!(
                extracted = report.extracted.len(),
                already_extracted = report.already_extracted,
                deleted = report.deleted_archives,
                failed = report.failed.len(),
                "Archive extraction finished"
            );
        }

        let backup_dir_name = request.post_success.backup_dir_name.trim().to_string();
        let discovery = self.discovery.clone();
        let discovery_request =
            DiscoveryRequest::new(request.root.clone(), request.recursive, request.categories)
                .with_excluded_dir(backup_dir_name.clone());
        let report = tokio::task::spawn_blocking(move || discovery.discover(&discovery_request))
            .await
            .map_err(|e| DiscoveryError::TaskFailed(e.to_string()))??;

        let total_discovered = report.jobs.len();
        let plan = Arc::new(OutputPlan::build(
            &report.jobs,
            &policy,
            Some(backup_dir_name.as_str()).filter(|name| !name.is_empty()),
        ));

        let batch_id = match self.ledger.start_new_batch(&request.root) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Could not start ledger batch, progress will not survive a crash");
                uuid::Uuid::new_v4().to_string()
            }
        };

        let (resumed, pending): (Vec<ConversionJob>, Vec<ConversionJob>) = report
            .jobs
            .into_iter()
            .partition(|job| self.ledger.is_completed(job.ledger_key()));
        if !resumed.is_empty() {
            info!(
                resumed = resumed.len(),
                remaining = pending.len(),
                "Resuming batch from ledger"
            );
        }

        self.set_state(BatchState::Sizing);
        let baseline = ResourceMonitor::baseline(request.max_workers, self.cores);
        let snapshot = self.monitor.sample();
        let workers = self
            .monitor
            .recommended_worker_count(baseline, snapshot.as_ref())
            .min(request.max_workers)
            .min(pending.len().max(1));
        let thread_hint = (self.cores / workers).max(1);
        info!(
            batch_id = %batch_id,
            jobs = pending.len(),
            workers,
            thread_hint,
            "Starting batch"
        );

        let mut stats = AggregateStats::new(pending.len());
        let mut failures = Vec::new();
        let mut cancelling = false;

        self.set_state(BatchState::Running);
        self.pool.reset(workers, pending.len());

        if !pending.is_empty() {
            let executor = Arc::new(
                JobExecutor::new(
                    self.converter.clone(),
                    plan,
                    post_action,
                    self.monitor.clone(),
                )
                .with_thread_hint(thread_hint),
            );
            let policy = Arc::new(policy);
            let semaphore = Arc::new(Semaphore::new(workers));

            let mut tasks = JoinSet::new();
            let mut descriptors = HashMap::with_capacity(pending.len());
            for job in pending {
                let descriptor = job.descriptor().to_path_buf();
                let handle = tasks.spawn(Self::run_job(
                    job,
                    executor.clone(),
                    policy.clone(),
                    semaphore.clone(),
                    cancel.clone(),
                    self.pool.clone(),
                ));
                descriptors.insert(handle.id(), descriptor);
            }

            let mut ticker = tokio::time::interval(self.resource_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    joined = tasks.join_next_with_id() => {
                        let Some(joined) = joined else { break };
                        let result = match joined {
                            Ok((id, result)) => {
                                descriptors.remove(&id);
                                result
                            }
                            Err(e) => task_failure(&mut descriptors, e),
                        };
                        self.record(result, &mut stats, &mut failures, workers);
                    }
                    _ = cancel.cancelled(), if !cancelling => {
                        cancelling = true;
                        semaphore.close();
                        info!(
                            running = self.pool.to_status().active_jobs,
                            "Cancellation requested, letting running jobs finish"
                        );
                        self.set_state(BatchState::Cancelling);
                    }
                    _ = ticker.tick() => self.check_pressure(workers),
                }
            }
        }

        self.set_state(BatchState::Completing);
        let cancelled = cancelling || stats.cancelled_count > 0 || cancel.is_cancelled();
        let ledger_cleared = if stats.failure_count == 0 && !cancelled {
            match self.ledger.clear() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Could not clear ledger");
                    false
                }
            }
        } else {
            false
        };

        let summary = BatchSummary {
            batch_id,
            workers,
            peak_concurrency: self.pool.to_status().peak_active,
            total_discovered,
            success_count: stats.success_count,
            failure_count: stats.failure_count,
            skipped_existing: stats.skipped_count,
            resumed_from_ledger: resumed.len(),
            cancelled_count: stats.cancelled_count,
            total_original_bytes: stats.total_original_bytes,
            total_output_bytes: stats.total_output_bytes,
            failures,
            elapsed: started.elapsed(),
            ledger_cleared,
        };

        let label = if cancelled {
            "cancelled"
        } else if summary.failure_count > 0 {
            "with_failures"
        } else {
            "clean"
        };
        metrics::BATCHES_TOTAL.with_label_values(&[label]).inc();

        info!(
            batch_id = %summary.batch_id,
            succeeded = summary.success_count,
            failed = summary.failure_count,
            skipped = summary.skipped_already_done(),
            cancelled = summary.cancelled_count,
            bytes_saved = summary.bytes_saved(),
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Batch finished"
        );
        for observer in &self.observers {
            observer.on_batch_finished(&summary);
        }
        Ok(summary)
    }

    /// One job: wait for a worker slot, then execute unless cancelled.
    async fn run_job(
        job: ConversionJob,
        executor: Arc<JobExecutor<C>>,
        policy: Arc<FormatPolicy>,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
        pool: Arc<PoolStats>,
    ) -> JobResult {
        let descriptor = job.descriptor().to_path_buf();
        let permit = semaphore.acquire_owned().await;
        pool.dequeue();
        let _permit = match permit {
            Ok(permit) if !cancel.is_cancelled() => permit,
            _ => return JobResult::cancelled(descriptor),
        };

        pool.start();
        let started = Instant::now();
        // Run in its own task so a panic becomes a failed job for this descriptor.
        let worker = tokio::spawn(async move { executor.execute(&job, &policy).await });
        let result = match worker.await {
            Ok(result) => result,
            Err(e) => {
                error!(path = %descriptor.display(), error = %e, "Worker panicked");
                JobResult::failed(
                    descriptor,
                    FailureReason::new(FailureKind::Execution, format!("worker failed: {}", e)),
                    started.elapsed(),
                )
            }
        };
        pool.finish(result.outcome.is_failure());
        result
    }

    /// Ledger first, then counters, then observers.
    fn record(
        &self,
        result: JobResult,
        stats: &mut AggregateStats,
        failures: &mut Vec<FailedJob>,
        workers: usize,
    ) {
        if result.outcome.is_done() {
            if let Err(e) = self.ledger.mark_completed(&result.descriptor) {
                warn!(path = %result.descriptor.display(), error = %e, "Could not record job in ledger");
            }
        }

        let label = result.outcome.label();
        metrics::JOBS_TOTAL.with_label_values(&[label]).inc();
        if matches!(result.outcome, JobOutcome::Success | JobOutcome::Failed(_)) {
            metrics::JOB_DURATION
                .with_label_values(&[label])
                .observe(result.duration_secs());
        }
        if let Some(saved) = result.bytes_saved().filter(|s| *s > 0) {
            metrics::BYTES_SAVED.inc_by(saved as u64);
        }

        stats.record(&result);
        if let JobOutcome::Failed(reason) = &result.outcome {
            failures.push(FailedJob {
                descriptor: result.descriptor.clone(),
                reason: reason.clone(),
            });
        }

        let update = stats.progress(result.duration, workers);
        debug!(
            completed = update.completed,
            total = update.total,
            outcome = label,
            "Job finished"
        );
        for observer in &self.observers {
            observer.on_job_finished(&result);
            observer.on_progress(&update);
        }
    }

    fn check_pressure(&self, workers: usize) {
        let Some(snapshot) = self.monitor.sample() else {
            return;
        };
        let recommended = self
            .monitor
            .recommended_worker_count(workers, Some(&snapshot));
        match self.monitor.pressure(&snapshot) {
            PressureLevel::High => warn!(
                cpu_percent = snapshot.cpu_percent,
                mem_percent = snapshot.mem_percent,
                workers,
                recommended,
                "High resource pressure"
            ),
            PressureLevel::Moderate => debug!(
                cpu_percent = snapshot.cpu_percent,
                mem_percent = snapshot.mem_percent,
                workers,
                recommended,
                "Moderate resource pressure"
            ),
            PressureLevel::Normal => {}
        }
    }
}

/// Result for a job whose task ended without returning one.
fn task_failure(descriptors: &mut HashMap<tokio::task::Id, PathBuf>, error: JoinError) -> JobResult {
    let descriptor = descriptors.remove(&error.id()).unwrap_or_default();
    error!(path = %descriptor.display(), error = %error, "Job task failed");
    JobResult::failed(
        descriptor,
        FailureReason::new(FailureKind::Execution, format!("job task failed: {}", error)),
        Duration::ZERO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostSuccessConfig;
    use crate::ledger::MemoryLedger;
    use crate::platform::{CategorySet, OutputFormat};
    use crate::testing::{fixtures, MockConverter};
    use tempfile::TempDir;

    fn dispatcher(converter: MockConverter) -> Dispatcher<MockConverter> {
        Dispatcher::new(
            converter,
            Arc::new(MemoryLedger::new()),
            Arc::new(ResourceMonitor::unavailable()),
        )
        .with_cores(8)
    }

    #[tokio::test]
    async fn test_empty_categories_rejected() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(MockConverter::new());
        let request = BatchRequest::new(dir.path()).with_categories(CategorySet::none());
        assert!(matches!(
            d.run_batch(request).await,
            Err(BatchError::Configuration(_))
        ));
        assert_eq!(d.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_conflicting_post_actions_rejected() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(MockConverter::new());
        let post = PostSuccessConfig {
            move_to_backup: true,
            delete_originals: true,
            ..Default::default()
        };
        let request = BatchRequest::new(dir.path()).with_post_success(post);
        assert!(matches!(
            d.run_batch(request).await,
            Err(BatchError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_chd_tool_rejected() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_supported(&[OutputFormat::Cso]);
        let d = dispatcher(converter);
        assert!(matches!(
            d.run_batch(BatchRequest::new(dir.path())).await,
            Err(BatchError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_root_is_discovery_error() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(MockConverter::new());
        let result = d.run_batch(BatchRequest::new(dir.path().join("nope"))).await;
        assert!(matches!(result, Err(BatchError::Discovery(_))));
        assert_eq!(d.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_empty_directory_completes() {
        let dir = TempDir::new().unwrap();
        let d = dispatcher(MockConverter::new());
        let summary = d.run_batch(BatchRequest::new(dir.path())).await.unwrap();
        assert_eq!(summary.total_discovered, 0);
        assert!(summary.is_clean());
        assert!(summary.ledger_cleared);
    }

    #[tokio::test]
    async fn test_pool_capped_by_job_count() {
        let dir = TempDir::new().unwrap();
        fixtures::cue_game(dir.path(), "One");
        fixtures::cue_game(dir.path(), "Two");
        let d = dispatcher(MockConverter::new());

        let summary = d
            .run_batch(BatchRequest::new(dir.path()).with_max_workers(6))
            .await
            .unwrap();
        assert_eq!(summary.workers, 2);
        assert_eq!(summary.success_count, 2);

        let status = d.pool_status();
        assert_eq!(status.total_processed, 2);
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.queued_jobs, 0);
    }

    #[tokio::test]
    async fn test_failed_job_recorded() {
        let dir = TempDir::new().unwrap();
        fixtures::cue_game(dir.path(), "Broken");
        let converter = MockConverter::new();
        converter
            .set_failure("Broken.cue", crate::testing::MockFailure::Exit)
            .await;
        let d = dispatcher(converter);

        let summary = d.run_batch(BatchRequest::new(dir.path())).await.unwrap();
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.failures[0].descriptor.file_name().unwrap(), "Broken.cue");
        assert!(!summary.ledger_cleared);
        assert_eq!(d.pool_status().total_failed, 1);
    }

    #[tokio::test]
    async fn test_task_failure_names_descriptor() {
        let mut tasks: JoinSet<JobResult> = JoinSet::new();
        let mut descriptors = HashMap::new();
        let handle = tasks.spawn(async { panic!("worker exploded") });
        descriptors.insert(handle.id(), PathBuf::from("/roms/Exploding.cue"));

        let error = match tasks.join_next_with_id().await {
            Some(Err(e)) => e,
            _ => panic!("task should have panicked"),
        };
        let result = task_failure(&mut descriptors, error);

        assert_eq!(result.descriptor, PathBuf::from("/roms/Exploding.cue"));
        assert!(result.outcome.is_failure());
        assert!(descriptors.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_batch_cancels_it() {
        let dir = TempDir::new().unwrap();
        fixtures::cue_game(dir.path(), "One");
        fixtures::cue_game(dir.path(), "Two");
        let converter = MockConverter::new();
        let d = dispatcher(converter.clone());

        d.cancellation_token().cancel();
        let summary = d.run_batch(BatchRequest::new(dir.path())).await.unwrap();

        assert!(summary.was_cancelled());
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.cancelled_count, 2);
        assert!(!summary.ledger_cleared);
        assert_eq!(converter.conversion_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_while_idle_is_ignored() {
        let dir = TempDir::new().unwrap();
        fixtures::cue_game(dir.path(), "One");
        let d = dispatcher(MockConverter::new());

        d.cancel();
        let summary = d.run_batch(BatchRequest::new(dir.path())).await.unwrap();
        assert_eq!(summary.success_count, 1);
        assert!(!summary.was_cancelled());
    }
}
