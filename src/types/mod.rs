//! Value types shared by the store, the task runner and callers.
//!
//! The durable [`TaskState`](crate::domain::TaskState) record is built from
//! these: identifiers, the schedule and the lifecycle status.

pub mod ids;
pub mod schedule;
pub mod status;

pub use ids::{EngineId, TaskId};
pub use schedule::TaskSchedule;
pub use status::TaskStatus;

/// Opaque, string-keyed configuration document handed to a task at start.
///
/// The core never looks inside it.
pub type Configuration = serde_json::Map<String, serde_json::Value>;
