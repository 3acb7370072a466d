//! Identifier newtypes for tasks and engine instances.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, globally unique task identifier.
///
/// Assigned by storage when a task state is first persisted and immutable
/// afterwards. Callers receive it from
/// [`new_state`](crate::store::TaskStateStorage::new_state) and may also
/// rebuild one from a string they stored elsewhere.
///
/// # Examples
///
/// ```
/// use engine_tasks::TaskId;
///
/// let id = TaskId::from("4b1c1f0e-0000-4000-8000-000000000000");
/// assert_eq!(id.as_str(), "4b1c1f0e-0000-4000-8000-000000000000");
/// assert_eq!(id.to_string(), id.as_str());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a fresh `UUIDv4` task ID. Only storage assigns IDs.
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a live engine process instance.
///
/// Generated once when the engine process starts and handed to every
/// component that claims tasks on its behalf. It only attributes ownership;
/// holding an `EngineId` grants nothing.
///
/// # Examples
///
/// ```
/// use engine_tasks::EngineId;
///
/// let a = EngineId::generate();
/// let b = EngineId::generate();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(String);

impl EngineId {
    /// Generates a new engine ID. Call once per process.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EngineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EngineId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
