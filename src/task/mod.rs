//! Executable task capability and the framework pieces that drive it.
//!
//! - [`BackgroundTask`] - The contract every task class implements.
//! - [`TaskOutcome`] - How a `start`/`resume` call ended.
//! - [`TaskControl`] - Cooperative stop/pause signal for implementations.
//! - [`TaskRegistry`](registry::TaskRegistry) - `taskClass` key to factory.
//! - [`CheckpointSaver`](checkpoint::CheckpointSaver) - Persists checkpoint
//!   tokens into the task's record.
//! - [`TaskRunner`](runner::TaskRunner) - Claims, spawns, and records outcomes.

pub mod checkpoint;
pub mod registry;
pub mod runner;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use checkpoint::CheckpointSaver;
pub use registry::{TaskFactory, TaskRegistry};
pub use runner::TaskRunner;

use crate::types::Configuration;

/// How a task's `start` or `resume` call returned.
///
/// A returned `Err` is the fourth outcome: the runner records it as
/// `Failed` with the error chain in `exception`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work is done.
    Completed,
    /// The task honoured a stop request.
    Stopped,
    /// The task honoured a pause request; its last checkpoint is kept.
    Paused,
}

/// Executable behaviour behind a `taskClass` key.
///
/// Implementations are created per run by a
/// [`TaskRegistry`](registry::TaskRegistry) factory. `stop` and `pause` are
/// called from outside the task's own execution, concurrently with a running
/// `start` or `resume`, and must only signal. [`TaskControl`] does that.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use engine_tasks::task::{BackgroundTask, CheckpointSaver, TaskControl, TaskOutcome};
/// use engine_tasks::Configuration;
///
/// #[derive(Default)]
/// struct CountTask {
///     control: TaskControl,
/// }
///
/// #[async_trait]
/// impl BackgroundTask for CountTask {
///     async fn start(
///         &self,
///         saver: CheckpointSaver,
///         _configuration: Configuration,
///     ) -> anyhow::Result<TaskOutcome> {
///         for step in 0..3 {
///             if let Some(outcome) = self.control.interrupted() {
///                 return Ok(outcome);
///             }
///             saver.save(step.to_string()).await?;
///         }
///         Ok(TaskOutcome::Completed)
///     }
///
///     fn stop(&self) {
///         self.control.stop();
///     }
///
///     fn pause(&self) {
///         self.control.pause();
///     }
///
///     async fn resume(
///         &self,
///         saver: CheckpointSaver,
///         _last_checkpoint: Option<String>,
///     ) -> anyhow::Result<TaskOutcome> {
///         self.start(saver, Configuration::new()).await
///     }
/// }
/// ```
#[async_trait]
pub trait BackgroundTask: Send + Sync {
    /// Runs the task with its stored configuration.
    ///
    /// May call [`CheckpointSaver::save`] any number of times.
    async fn start(
        &self,
        saver: CheckpointSaver,
        configuration: Configuration,
    ) -> anyhow::Result<TaskOutcome>;

    /// Requests cooperative cancellation. Must not block.
    fn stop(&self);

    /// Requests cooperative suspension. Must not block.
    fn pause(&self);

    /// Continues a paused task from `last_checkpoint`.
    async fn resume(
        &self,
        saver: CheckpointSaver,
        last_checkpoint: Option<String>,
    ) -> anyhow::Result<TaskOutcome>;
}

/// Cooperative stop/pause signal shared between a task and its controllers.
///
/// Stop takes precedence over pause. Implementations poll
/// [`interrupted`](Self::interrupted) at safe points, or await
/// [`stopped`](Self::stopped) inside a `tokio::select!`.
///
/// # Examples
///
/// ```
/// use engine_tasks::task::{TaskControl, TaskOutcome};
///
/// let control = TaskControl::new();
/// assert_eq!(control.interrupted(), None);
///
/// control.pause();
/// assert_eq!(control.interrupted(), Some(TaskOutcome::Paused));
///
/// control.stop();
/// assert_eq!(control.interrupted(), Some(TaskOutcome::Stopped));
/// ```
#[derive(Debug, Default)]
pub struct TaskControl {
    cancel: CancellationToken,
    paused: AtomicBool,
}

impl TaskControl {
    /// Creates a control with neither signal raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the stop signal.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Raises the pause signal.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Clears the pause signal before a resumed run.
    pub fn clear_pause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `true` while a pause request is pending.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// The outcome the task should return now, if any signal is raised.
    pub fn interrupted(&self) -> Option<TaskOutcome> {
        if self.is_stopped() {
            Some(TaskOutcome::Stopped)
        } else if self.is_paused() {
            Some(TaskOutcome::Paused)
        } else {
            None
        }
    }

    /// Completes once stop was requested.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }
}
