use std::sync::Arc;

use async_trait::async_trait;

use super::DebounceGate;
use crate::task::{BackgroundTask, CheckpointSaver, TaskOutcome};
use crate::types::Configuration;

/// Deferred maintenance work, such as consolidating duplicates.
///
/// Implemented outside this crate. `stop` is called concurrently with a
/// running `run` and must only signal.
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    /// Begins or continues the maintenance work.
    async fn run(&self) -> anyhow::Result<()>;

    /// Asks a running `run` to halt.
    fn stop(&self);
}

/// Background task that runs a [`MaintenanceJob`] once activity has settled.
///
/// Each start checks its [`DebounceGate`]. A closed gate completes the run
/// without touching the job; the scheduler is expected to start the task
/// again later. The task keeps no progress of its own, so pause is ignored
/// and resume completes straight away.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// # use async_trait::async_trait;
/// use engine_tasks::postprocessing::{
///     ActivityTracker, DebounceGate, MaintenanceJob, PostProcessingTask,
///     POST_PROCESSING_TASK_CLASS,
/// };
/// use engine_tasks::task::TaskRegistry;
///
/// # struct Consolidate;
/// # #[async_trait]
/// # impl MaintenanceJob for Consolidate {
/// #     async fn run(&self) -> anyhow::Result<()> { Ok(()) }
/// #     fn stop(&self) {}
/// # }
/// let tracker = ActivityTracker::new();
/// let gate = DebounceGate::new(tracker.clone(), Duration::from_secs(60));
/// let job: Arc<dyn MaintenanceJob> = Arc::new(Consolidate);
///
/// let registry = TaskRegistry::new();
/// registry.register(POST_PROCESSING_TASK_CLASS, move || {
///     Arc::new(PostProcessingTask::new(gate.clone(), Arc::clone(&job)))
/// });
/// ```
pub struct PostProcessingTask {
    gate: DebounceGate,
    job: Arc<dyn MaintenanceJob>,
}

impl PostProcessingTask {
    /// Creates a task that runs `job` behind `gate`.
    pub fn new(gate: DebounceGate, job: Arc<dyn MaintenanceJob>) -> Self {
        Self { gate, job }
    }
}

impl std::fmt::Debug for PostProcessingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessingTask")
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BackgroundTask for PostProcessingTask {
    async fn start(
        &self,
        saver: CheckpointSaver,
        _configuration: Configuration,
    ) -> anyhow::Result<TaskOutcome> {
        if self.gate.should_run() {
            tracing::info!(task_id = %saver.task_id(), "running post-processing");
            self.job.run().await?;
        } else {
            tracing::info!(task_id = %saver.task_id(), "activity too recent; skipping post-processing");
        }
        Ok(TaskOutcome::Completed)
    }

    fn stop(&self) {
        self.job.stop();
    }

    fn pause(&self) {}

    async fn resume(
        &self,
        _saver: CheckpointSaver,
        _last_checkpoint: Option<String>,
    ) -> anyhow::Result<TaskOutcome> {
        Ok(TaskOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocessing::ActivityTracker;
    use crate::store::memory::InMemoryTaskStateStore;
    use crate::types::{EngineId, TaskId};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingJob {
        runs: AtomicUsize,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl MaintenanceJob for CountingJob {
        async fn run(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn saver() -> CheckpointSaver {
        CheckpointSaver::new(
            Arc::new(InMemoryTaskStateStore::new()),
            TaskId::from("pp"),
            EngineId::from("engine-pp"),
        )
    }

    #[tokio::test]
    async fn closed_gate_skips_the_job() {
        let job = Arc::new(CountingJob::default());
        let gate = DebounceGate::new(ActivityTracker::new(), Duration::from_secs(3600));
        let task = PostProcessingTask::new(gate, job.clone());

        let outcome = task.start(saver(), Configuration::new()).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_gate_runs_the_job_once() {
        let job = Arc::new(CountingJob::default());
        let tracker = ActivityTracker::starting_at(Utc.timestamp_millis_opt(0).unwrap());
        let task = PostProcessingTask::new(DebounceGate::new(tracker, Duration::ZERO), job.clone());

        task.start(saver(), Configuration::new()).await.unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_reaches_the_job_and_resume_completes() {
        let job = Arc::new(CountingJob::default());
        let task = PostProcessingTask::new(
            DebounceGate::new(ActivityTracker::new(), Duration::ZERO),
            job.clone(),
        );

        task.pause();
        task.stop();
        assert!(job.stopped.load(Ordering::SeqCst));

        let outcome = task.resume(saver(), Some("ignored".into())).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
