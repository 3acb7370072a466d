//! Task lifecycle status and the transition rules between statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskError;

/// Task lifecycle status.
///
/// A task progresses through these states according to a fixed state
/// machine. Terminal states (`Completed`, `Failed`, `Stopped`) reject all
/// transitions. Self-transitions are rejected.
///
/// # State Machine
///
/// ```text
/// Created   -> Scheduled, Stopped
/// Scheduled -> Running, Stopped
/// Running   -> Paused, Completed, Failed, Stopped
/// Paused    -> Running, Completed, Failed, Stopped
/// Completed -> (terminal, no transitions)
/// Failed    -> (terminal, no transitions)
/// Stopped   -> (terminal, no transitions)
/// ```
///
/// `Scheduled -> Running` is the *claim*: the only transition that attributes
/// the task to an engine.
///
/// # Examples
///
/// ```
/// use engine_tasks::TaskStatus;
///
/// let status = TaskStatus::Running;
/// assert!(!status.is_terminal());
/// assert!(status.can_transition_to(&TaskStatus::Paused));
/// assert!(!status.can_transition_to(&TaskStatus::Running)); // self-transition rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task has been recorded but is not yet due.
    Created,
    /// Task is due and waiting to be claimed by an engine.
    Scheduled,
    /// Task is claimed by an engine and executing.
    Running,
    /// Task is suspended; its checkpoint allows it to resume.
    Paused,
    /// Task finished successfully (terminal).
    Completed,
    /// Task failed; `exception` holds the failure detail (terminal).
    Failed,
    /// Task was stopped before finishing (terminal).
    Stopped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TaskStatus; 7] = [
        Self::Created,
        Self::Scheduled,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Stopped,
    ];

    /// Returns the canonical upper-case name, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }

    /// Returns `true` if this status is terminal (no further transitions allowed).
    ///
    /// # Examples
    ///
    /// ```
    /// use engine_tasks::TaskStatus;
    ///
    /// assert!(!TaskStatus::Running.is_terminal());
    /// assert!(!TaskStatus::Paused.is_terminal());
    /// assert!(TaskStatus::Completed.is_terminal());
    /// assert!(TaskStatus::Failed.is_terminal());
    /// assert!(TaskStatus::Stopped.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns `true` if a task in this status is attributed to an engine.
    ///
    /// Only `Running` and `Paused` tasks may carry an engine ID.
    pub fn holds_engine(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns `true` if transitioning from this status to `next` is valid.
    ///
    /// # Examples
    ///
    /// ```
    /// use engine_tasks::TaskStatus;
    ///
    /// assert!(TaskStatus::Scheduled.can_transition_to(&TaskStatus::Running));
    /// assert!(TaskStatus::Paused.can_transition_to(&TaskStatus::Running));
    /// assert!(!TaskStatus::Created.can_transition_to(&TaskStatus::Running));
    /// assert!(!TaskStatus::Completed.can_transition_to(&TaskStatus::Running));
    /// ```
    pub fn can_transition_to(&self, next: &Self) -> bool {
        if self == next {
            return false;
        }

        match self {
            Self::Created => matches!(next, Self::Scheduled | Self::Stopped),
            Self::Scheduled => matches!(next, Self::Running | Self::Stopped),
            Self::Running => matches!(
                next,
                Self::Paused | Self::Completed | Self::Failed | Self::Stopped
            ),
            Self::Paused => matches!(
                next,
                Self::Running | Self::Completed | Self::Failed | Self::Stopped
            ),
            Self::Completed | Self::Failed | Self::Stopped => false,
        }
    }

    /// Validates a transition from this status to `next`.
    ///
    /// Returns `Ok(())` if the transition is valid, or a
    /// [`TaskError::InvalidTransition`] naming the rejected transition.
    ///
    /// # Examples
    ///
    /// ```
    /// use engine_tasks::TaskStatus;
    ///
    /// assert!(TaskStatus::Running
    ///     .validate_transition("task-123", &TaskStatus::Completed)
    ///     .is_ok());
    /// assert!(TaskStatus::Completed
    ///     .validate_transition("task-123", &TaskStatus::Running)
    ///     .is_err());
    /// ```
    pub fn validate_transition(&self, task_id: &str, next: &Self) -> Result<(), TaskError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TaskError::InvalidTransition {
                task_id: task_id.to_string(),
                from: *self,
                to: *next,
            })
        }
    }
}
