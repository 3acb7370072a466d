//! Task state -- the durable record describing one task instance.
//!
//! [`TaskState`] is what storage persists and indexes. Identity and
//! definition fields (`task_class`, `creator`, `schedule`, `configuration`)
//! are fixed at creation; the lifecycle fields (`status`, `engine_id`,
//! `checkpoint`, `exception`, `status_changed_by`) change as the task moves
//! through the state machine.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::types::{Configuration, EngineId, TaskId, TaskSchedule, TaskStatus};

/// Durable record of one task instance and its current status.
///
/// All fields are public so that store implementors have full access. The
/// `with_*` helpers keep the status invariants intact when a caller mutates
/// a retrieved state:
///
/// - `engine_id` is only present while `Running` or `Paused`.
/// - `exception` is only present while `Failed`.
///
/// `version` is storage metadata: populated on every read and write, never
/// serialized, and ignored by equality.
///
/// # Examples
///
/// ```
/// use engine_tasks::{EngineId, TaskSchedule, TaskState, TaskStatus};
/// use serde_json::Map;
///
/// let engine = EngineId::generate();
/// let state = TaskState::new("post-processing", "engine", TaskSchedule::now(), Map::new())
///     .with_running(engine.clone())
///     .with_checkpoint("step-3");
///
/// assert_eq!(state.status, TaskStatus::Running);
/// assert_eq!(state.engine_id, Some(engine));
/// assert!(state.id.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    /// Assigned by storage on creation; `None` until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,

    /// Registry key of the executable behaviour.
    pub task_class: String,

    /// Actor that created the task.
    pub creator: String,

    /// When the task becomes eligible to run.
    pub schedule: TaskSchedule,

    /// Opaque document passed to the task at start.
    #[serde(default)]
    pub configuration: Configuration,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Actor that performed the last status transition.
    #[serde(default)]
    pub status_changed_by: Option<String>,

    /// Engine currently (or last) executing the task.
    #[serde(default)]
    pub engine_id: Option<EngineId>,

    /// Last checkpoint token recorded by the task implementation.
    #[serde(default)]
    pub checkpoint: Option<String>,

    /// Failure detail, present only for failed tasks.
    #[serde(default)]
    pub exception: Option<String>,

    /// Storage record version; `0` for a state never read from storage.
    #[serde(skip)]
    pub version: u64,
}

impl PartialEq for TaskState {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.task_class == other.task_class
            && self.creator == other.creator
            && self.schedule == other.schedule
            && self.configuration == other.configuration
            && self.status == other.status
            && self.status_changed_by == other.status_changed_by
            && self.engine_id == other.engine_id
            && self.checkpoint == other.checkpoint
            && self.exception == other.exception
    }
}

impl TaskState {
    /// Creates a new, id-less state in the `Created` status.
    pub fn new(
        task_class: impl Into<String>,
        creator: impl Into<String>,
        schedule: TaskSchedule,
        configuration: Configuration,
    ) -> Self {
        Self {
            id: None,
            task_class: task_class.into(),
            creator: creator.into(),
            schedule,
            configuration,
            status: TaskStatus::Created,
            status_changed_by: None,
            engine_id: None,
            checkpoint: None,
            exception: None,
            version: 0,
        }
    }

    /// Returns the storage-assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] for a state that was never persisted.
    pub fn require_id(&self) -> Result<&TaskId, TaskError> {
        self.id
            .as_ref()
            .ok_or_else(|| TaskError::validation("task state has no id; create it first"))
    }

    /// Sets the status, dropping fields the new status may not carry.
    ///
    /// Leaving `Running`/`Paused` clears `engine_id`; leaving `Failed`
    /// clears `exception`. Use [`with_running`](Self::with_running) and
    /// [`with_failure`](Self::with_failure) to enter those statuses.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        if !status.holds_engine() {
            self.engine_id = None;
        }
        if status != TaskStatus::Failed {
            self.exception = None;
        }
        self
    }

    /// Marks the task `Running` on the given engine.
    pub fn with_running(mut self, engine_id: EngineId) -> Self {
        self = self.with_status(TaskStatus::Running);
        self.engine_id = Some(engine_id);
        self
    }

    /// Marks the task `Failed` with the given failure detail.
    pub fn with_failure(mut self, exception: impl Into<String>) -> Self {
        self = self.with_status(TaskStatus::Failed);
        self.exception = Some(exception.into());
        self
    }

    /// Records the checkpoint token.
    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }

    /// Records who performed the last status change.
    pub fn with_status_changed_by(mut self, actor: impl Into<String>) -> Self {
        self.status_changed_by = Some(actor.into());
        self
    }

    /// Checks the field invariants that hold for every stored state.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] when a required field is empty, the
    /// schedule is malformed, `engine_id` is set outside `Running`/`Paused`,
    /// or `exception` is set outside `Failed`.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.task_class.trim().is_empty() {
            return Err(TaskError::validation("task class must not be empty"));
        }
        if self.creator.trim().is_empty() {
            return Err(TaskError::validation("creator must not be empty"));
        }
        self.schedule.validate()?;
        if self.engine_id.is_some() && !self.status.holds_engine() {
            return Err(TaskError::validation(format!(
                "engine id may only be set while RUNNING or PAUSED, status is {}",
                self.status
            )));
        }
        if self.exception.is_some() && self.status != TaskStatus::Failed {
            return Err(TaskError::validation(format!(
                "exception may only be set while FAILED, status is {}",
                self.status
            )));
        }
        Ok(())
    }

    /// Returns `true` if `other` has the same immutable definition fields.
    pub fn same_definition(&self, other: &Self) -> bool {
        self.task_class == other.task_class
            && self.creator == other.creator
            && self.schedule == other.schedule
            && self.configuration == other.configuration
    }

    /// Builds the id-less `Created` state for the next run of a recurring task.
    ///
    /// Returns `None` for one-shot tasks. Storage never calls this; an
    /// external scheduler does once the current occurrence completes.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use chrono::Utc;
    /// use engine_tasks::{TaskSchedule, TaskState, TaskStatus};
    ///
    /// let schedule = TaskSchedule::recurring(Utc::now(), Duration::from_secs(60));
    /// let done = TaskState::new("analytics", "scheduler", schedule.clone(), Default::default())
    ///     .with_status(TaskStatus::Completed);
    ///
    /// let next = done.next_occurrence().unwrap();
    /// assert_eq!(next.status, TaskStatus::Created);
    /// assert!(next.schedule.run_at > schedule.run_at);
    /// ```
    pub fn next_occurrence(&self) -> Option<Self> {
        let schedule = self.schedule.next_occurrence()?;
        Some(Self::new(
            self.task_class.clone(),
            self.creator.clone(),
            schedule,
            self.configuration.clone(),
        ))
    }
}
