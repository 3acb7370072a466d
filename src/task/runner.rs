//! Drives claimed tasks on the tokio runtime and records how they end.
//!
//! The runner is what an external scheduler calls once it has decided which
//! task to run. It never picks work itself.
//!
//! # Lifecycle
//!
//! ```text
//! claim_and_start: SCHEDULED -> RUNNING (claim) -> spawn start()
//! resume:          PAUSED    -> RUNNING         -> spawn resume(last checkpoint)
//!
//! on exit:  Ok(Completed) -> COMPLETED
//!           Ok(Stopped)   -> STOPPED
//!           Ok(Paused)    -> PAUSED (engine id and checkpoint kept)
//!           Err(e)        -> FAILED, exception = "{e:#}"
//! ```
//!
//! Outcome writes are compare-and-swap and only land while the record is
//! still `Running` under this engine. If a supervisor re-attributed or
//! stopped the task meanwhile, the outcome is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{BackgroundTask, CheckpointSaver, TaskOutcome, TaskRegistry};
use crate::domain::TaskState;
use crate::error::TaskError;
use crate::store::TaskStateStorage;
use crate::types::{Configuration, EngineId, TaskId, TaskStatus};

/// Attempts made to record an outcome when the record changes concurrently,
/// typically because the task itself is saving a checkpoint.
const OUTCOME_WRITE_ATTEMPTS: usize = 5;

type LiveTasks = Arc<Mutex<HashMap<TaskId, Arc<dyn BackgroundTask>>>>;

enum Entry {
    Start(Configuration),
    Resume(Option<String>),
}

/// Executes tasks for one engine process.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// # use async_trait::async_trait;
/// # use engine_tasks::task::{BackgroundTask, CheckpointSaver, TaskOutcome};
/// use engine_tasks::store::memory::InMemoryTaskStateStore;
/// use engine_tasks::store::TaskStateStorage;
/// use engine_tasks::task::{TaskRegistry, TaskRunner};
/// use engine_tasks::{Configuration, EngineId, TaskSchedule, TaskState, TaskStatus};
///
/// # struct Noop;
/// # #[async_trait]
/// # impl BackgroundTask for Noop {
/// #     async fn start(&self, _: CheckpointSaver, _: Configuration) -> anyhow::Result<TaskOutcome> {
/// #         Ok(TaskOutcome::Completed)
/// #     }
/// #     fn stop(&self) {}
/// #     fn pause(&self) {}
/// #     async fn resume(&self, _: CheckpointSaver, _: Option<String>) -> anyhow::Result<TaskOutcome> {
/// #         Ok(TaskOutcome::Completed)
/// #     }
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = Arc::new(InMemoryTaskStateStore::new());
/// let registry = Arc::new(TaskRegistry::new());
/// registry.register("noop", || Arc::new(Noop));
///
/// let state = TaskState::new("noop", "scheduler", TaskSchedule::now(), Configuration::new())
///     .with_status(TaskStatus::Scheduled);
/// let id = store.new_state(state).await.unwrap();
///
/// let runner = TaskRunner::new(store.clone(), registry, EngineId::generate());
/// runner.claim_and_start(&id).await.unwrap();
/// runner.wait(&id).await;
///
/// assert_eq!(store.get_state(&id).await.unwrap().status, TaskStatus::Completed);
/// # });
/// ```
pub struct TaskRunner {
    store: Arc<dyn TaskStateStorage>,
    registry: Arc<TaskRegistry>,
    engine_id: EngineId,
    live: LiveTasks,
    handles: Mutex<HashMap<TaskId, JoinHandle<()>>>,
}

impl TaskRunner {
    /// Creates a runner that claims tasks as `engine_id`.
    pub fn new(
        store: Arc<dyn TaskStateStorage>,
        registry: Arc<TaskRegistry>,
        engine_id: EngineId,
    ) -> Self {
        Self {
            store,
            registry,
            engine_id,
            live: Arc::new(Mutex::new(HashMap::new())),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// The engine this runner claims tasks as.
    pub fn engine_id(&self) -> &EngineId {
        &self.engine_id
    }

    /// Claims a `Scheduled` task and starts it with its stored configuration.
    ///
    /// The task class is resolved before the claim, so an unknown class
    /// leaves the record untouched. Returns the claimed state.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist.
    /// - [`TaskError::UnknownTaskClass`] if its class is not registered.
    /// - [`TaskError::InvalidTransition`] if it is not `Scheduled`.
    /// - [`TaskError::Conflict`] if another engine claimed it first.
    pub async fn claim_and_start(&self, id: &TaskId) -> Result<TaskState, TaskError> {
        let current = self.store.get_state(id).await?;
        let task = self.registry.create(&current.task_class)?;

        let claimed = self
            .store
            .claim(id, &self.engine_id, self.engine_id.as_str())
            .await?;

        tracing::info!(
            task_id = %id,
            task_class = %claimed.task_class,
            engine_id = %self.engine_id,
            "starting task"
        );
        self.spawn(id.clone(), task, Entry::Start(claimed.configuration.clone()));
        Ok(claimed)
    }

    /// Moves a `Paused` task back to `Running` under this engine and resumes
    /// it from its last checkpoint.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist.
    /// - [`TaskError::UnknownTaskClass`] if its class is not registered.
    /// - [`TaskError::InvalidTransition`] if it is not `Paused`.
    /// - [`TaskError::Conflict`] if the record changed concurrently.
    pub async fn resume(&self, id: &TaskId) -> Result<TaskState, TaskError> {
        let current = self.store.get_state(id).await?;
        if current.status != TaskStatus::Paused {
            return Err(TaskError::InvalidTransition {
                task_id: id.to_string(),
                from: current.status,
                to: TaskStatus::Running,
            });
        }
        let task = self.registry.create(&current.task_class)?;

        let resumed = current
            .with_running(self.engine_id.clone())
            .with_status_changed_by(self.engine_id.as_str());
        let resumed = self.store.update_state_if_current(resumed).await?;

        tracing::info!(
            task_id = %id,
            task_class = %resumed.task_class,
            engine_id = %self.engine_id,
            checkpoint = resumed.checkpoint.as_deref(),
            "resuming task"
        );
        self.spawn(id.clone(), task, Entry::Resume(resumed.checkpoint.clone()));
        Ok(resumed)
    }

    /// Asks a task running on this engine to stop.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if this engine is not running it.
    pub fn stop(&self, id: &TaskId) -> Result<(), TaskError> {
        let task = self.live_task(id)?;
        tracing::info!(task_id = %id, engine_id = %self.engine_id, "stop requested");
        task.stop();
        Ok(())
    }

    /// Asks a task running on this engine to pause.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if this engine is not running it.
    pub fn pause(&self, id: &TaskId) -> Result<(), TaskError> {
        let task = self.live_task(id)?;
        tracing::info!(task_id = %id, engine_id = %self.engine_id, "pause requested");
        task.pause();
        Ok(())
    }

    /// Waits until the task's current run has ended and its outcome is
    /// recorded. Returns immediately if nothing is tracked for `id`.
    pub async fn wait(&self, id: &TaskId) {
        let handle = self.handles.lock().remove(id);
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(task_id = %id, error = %err, "task driver aborted");
            }
        }
    }

    /// IDs of the tasks currently executing on this engine, sorted.
    pub fn running(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.live.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops every live task and waits for all outcomes to be recorded.
    pub async fn shutdown(&self) {
        for id in self.running() {
            // A task may finish between listing and stopping.
            let _ = self.stop(&id);
        }
        let handles: Vec<(TaskId, JoinHandle<()>)> = self.handles.lock().drain().collect();
        for (id, handle) in handles {
            if let Err(err) = handle.await {
                tracing::error!(task_id = %id, error = %err, "task driver aborted");
            }
        }
    }

    fn live_task(&self, id: &TaskId) -> Result<Arc<dyn BackgroundTask>, TaskError> {
        self.live
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound {
                task_id: id.to_string(),
            })
    }

    fn spawn(&self, id: TaskId, task: Arc<dyn BackgroundTask>, entry: Entry) {
        self.live.lock().insert(id.clone(), Arc::clone(&task));

        let store = Arc::clone(&self.store);
        let live = Arc::clone(&self.live);
        let engine_id = self.engine_id.clone();
        let saver = CheckpointSaver::new(Arc::clone(&store), id.clone(), engine_id.clone());
        let tracked = Arc::clone(&task);
        let driver_id = id.clone();

        let driver = tokio::spawn(async move {
            // Run the task in its own tokio task so a panic is observed as a
            // JoinError here instead of skipping the outcome write.
            let execution = tokio::spawn(async move {
                match entry {
                    Entry::Start(configuration) => task.start(saver, configuration).await,
                    Entry::Resume(checkpoint) => task.resume(saver, checkpoint).await,
                }
            });
            let result = match execution.await {
                Ok(result) => result,
                Err(err) => Err(anyhow::anyhow!("task execution panicked: {err}")),
            };

            if let Err(err) = record_outcome(store.as_ref(), &engine_id, &driver_id, result).await {
                tracing::error!(
                    task_id = %driver_id,
                    engine_id = %engine_id,
                    error = %err,
                    "failed to record task outcome"
                );
            }
            // A quick resume may already have registered a new instance.
            let mut live = live.lock();
            if live.get(&driver_id).is_some_and(|t| Arc::ptr_eq(t, &tracked)) {
                live.remove(&driver_id);
            }
        });

        let mut handles = self.handles.lock();
        handles.retain(|_, handle| !handle.is_finished());
        handles.insert(id, driver);
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("engine_id", &self.engine_id)
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

/// Writes the status a finished run maps to.
async fn record_outcome(
    store: &dyn TaskStateStorage,
    engine_id: &EngineId,
    id: &TaskId,
    result: anyhow::Result<TaskOutcome>,
) -> Result<(), TaskError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = store.get_state(id).await?;
        if current.status != TaskStatus::Running || current.engine_id.as_ref() != Some(engine_id) {
            tracing::warn!(
                task_id = %id,
                engine_id = %engine_id,
                status = %current.status,
                owner = current.engine_id.as_ref().map(EngineId::as_str),
                "task no longer running here; dropping outcome"
            );
            return Ok(());
        }

        let next = match &result {
            Ok(TaskOutcome::Completed) => current.with_status(TaskStatus::Completed),
            Ok(TaskOutcome::Stopped) => current.with_status(TaskStatus::Stopped),
            Ok(TaskOutcome::Paused) => current.with_status(TaskStatus::Paused),
            Err(err) => current.with_failure(format!("{err:#}")),
        }
        .with_status_changed_by(engine_id.as_str());
        let status = next.status;

        match store.update_state_if_current(next).await {
            Ok(_) => {
                match &result {
                    Ok(_) => tracing::info!(
                        task_id = %id,
                        engine_id = %engine_id,
                        status = %status,
                        "task finished"
                    ),
                    Err(err) => tracing::error!(
                        task_id = %id,
                        engine_id = %engine_id,
                        error = %format_args!("{err:#}"),
                        "task failed"
                    ),
                }
                return Ok(());
            },
            Err(TaskError::Conflict { .. }) if attempt < OUTCOME_WRITE_ATTEMPTS => continue,
            Err(err) => return Err(err),
        }
    }
}
