//! Registry mapping `taskClass` keys to task factories.
//!
//! Task kinds stay open for extension: the host registers a factory per key at
//! startup, and the [`TaskRunner`](super::TaskRunner) instantiates a fresh
//! [`BackgroundTask`] for every run from the key stored in the task's record.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::BackgroundTask;
use crate::error::TaskError;

/// Thread-safe constructor for one task class.
pub type TaskFactory = Arc<dyn Fn() -> Arc<dyn BackgroundTask> + Send + Sync>;

/// Concurrent map from task class key to [`TaskFactory`].
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use async_trait::async_trait;
/// # use engine_tasks::task::{BackgroundTask, CheckpointSaver, TaskOutcome};
/// # use engine_tasks::Configuration;
/// use engine_tasks::task::TaskRegistry;
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
/// let registry = TaskRegistry::new();
/// registry.register("noop", || Arc::new(Noop));
///
/// assert!(registry.contains("noop"));
/// assert!(registry.create("noop").is_ok());
/// assert!(registry.create("missing").is_err());
/// ```
#[derive(Default)]
pub struct TaskRegistry {
    factories: DashMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `task_class`, replacing any previous one.
    pub fn register<F>(&self, task_class: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn BackgroundTask> + Send + Sync + 'static,
    {
        let task_class = task_class.into();
        tracing::info!(task_class = %task_class, "registered task class");
        self.factories.insert(task_class, Arc::new(factory));
    }

    /// Instantiates a fresh task for `task_class`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownTaskClass`] if nothing is registered
    /// under the key.
    pub fn create(&self, task_class: &str) -> Result<Arc<dyn BackgroundTask>, TaskError> {
        // Clone the factory out so the shard lock is not held while it runs.
        let factory = self
            .factories
            .get(task_class)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TaskError::UnknownTaskClass {
                task_class: task_class.to_string(),
            })?;
        Ok(factory())
    }

    /// Returns `true` if a factory is registered under `task_class`.
    pub fn contains(&self, task_class: &str) -> bool {
        self.factories.contains_key(task_class)
    }

    /// Returns the registered keys, sorted.
    pub fn task_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        classes.sort();
        classes
    }

    /// Returns the number of registered task classes.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("task_classes", &self.task_classes())
            .finish()
    }
}
