//! Error types for task state operations.
//!
//! Provides [`TaskError`], a rich error enum with context fields, and
//! [`TaskErrorKind`] for callers that only need to branch on the category
//! of failure.
//!
//! Execution failures inside a [`BackgroundTask`](crate::task::BackgroundTask)
//! are deliberately absent here: they never propagate to the caller of the
//! storage layer. They surface as a `Failed` status with the failure text
//! stored in the task's `exception` field.

use thiserror::Error;

use crate::types::status::TaskStatus;

/// Errors that can occur during task state operations.
///
/// Each variant carries contextual information (task ID, status, etc.)
/// to aid debugging. Use [`kind`](TaskError::kind) to branch on the
/// category without destructuring.
///
/// # Examples
///
/// ```
/// use engine_tasks::{TaskError, TaskErrorKind};
///
/// let err = TaskError::NotFound {
///     task_id: "missing-task".to_string(),
/// };
/// assert_eq!(err.kind(), TaskErrorKind::NotFound);
/// assert!(err.to_string().contains("missing-task"));
/// ```
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task state was rejected before it reached storage.
    #[error("invalid task state: {reason}")]
    Validation {
        /// Why the state was rejected.
        reason: String,
    },

    /// Task with the given ID was not found.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The task ID that was not found.
        task_id: String,
    },

    /// The stored record changed between read and write.
    #[error(
        "concurrent modification of task {task_id}: expected version {expected_version}, found {actual_version}"
    )]
    Conflict {
        /// The task that was being written.
        task_id: String,
        /// The version the writer read.
        expected_version: u64,
        /// The version currently stored.
        actual_version: u64,
    },

    /// Attempted an invalid state machine transition.
    #[error("invalid transition from {from} to {to} for task {task_id}")]
    InvalidTransition {
        /// The task that was being transitioned.
        task_id: String,
        /// The current status of the task.
        from: TaskStatus,
        /// The target status that was rejected.
        to: TaskStatus,
    },

    /// The writer no longer holds the task's execution claim.
    #[error("engine {engine_id} does not hold task {task_id} (status {status})")]
    NotOwner {
        /// The task that was being written.
        task_id: String,
        /// The engine that attempted the write.
        engine_id: String,
        /// The status currently stored.
        status: TaskStatus,
    },

    /// No factory is registered for the requested task class.
    #[error("unknown task class: {task_class}")]
    UnknownTaskClass {
        /// The unregistered task class key.
        task_class: String,
    },

    /// Backend storage or serialization error.
    #[error("store error: {0}")]
    Store(String),
}

/// Coarse category of a [`TaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// Malformed input rejected before persistence.
    Validation,
    /// Unknown task ID.
    NotFound,
    /// Optimistic concurrency failure.
    Conflict,
    /// State machine violation.
    InvalidTransition,
    /// Write from an engine that lost the task.
    NotOwner,
    /// Unregistered task class.
    UnknownTaskClass,
    /// Backend failure.
    Store,
}

impl TaskError {
    /// Shorthand for a [`TaskError::Validation`] with the given reason.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Returns the category of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use engine_tasks::{TaskError, TaskErrorKind};
    ///
    /// let err = TaskError::validation("interval must be positive");
    /// assert_eq!(err.kind(), TaskErrorKind::Validation);
    ///
    /// let err = TaskError::Store("db timeout".to_string());
    /// assert_eq!(err.kind(), TaskErrorKind::Store);
    /// ```
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            Self::Validation { .. } => TaskErrorKind::Validation,
            Self::NotFound { .. } => TaskErrorKind::NotFound,
            Self::Conflict { .. } => TaskErrorKind::Conflict,
            Self::InvalidTransition { .. } => TaskErrorKind::InvalidTransition,
            Self::NotOwner { .. } => TaskErrorKind::NotOwner,
            Self::UnknownTaskClass { .. } => TaskErrorKind::UnknownTaskClass,
            Self::Store(_) => TaskErrorKind::Store,
        }
    }
}
