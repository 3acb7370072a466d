//! Handle a running task uses to persist its checkpoint token.
//!
//! [`CheckpointSaver`] is scoped to a single task and the engine running it.
//! It hides the task ID and the store from task implementations: a task only
//! ever sees `save(token)`. Once the task is stopped, finished or handed to
//! another engine, saves from the old run are refused.
//!
//! `CheckpointSaver` is `Clone + Send + Sync` because it wraps an
//! `Arc<dyn TaskStateStorage>`, a [`TaskId`] and an [`EngineId`]. Cloning is
//! cheap and yields a handle to the same task.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use engine_tasks::store::memory::InMemoryTaskStateStore;
//! use engine_tasks::store::TaskStateStorage;
//! use engine_tasks::task::CheckpointSaver;
//! use engine_tasks::{EngineId, TaskSchedule, TaskState};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(InMemoryTaskStateStore::new());
//! let engine = EngineId::generate();
//! let state = TaskState::new("demo", "tester", TaskSchedule::now(), Default::default())
//!     .with_running(engine.clone());
//! let id = store.new_state(state).await.unwrap();
//!
//! let saver = CheckpointSaver::new(store.clone(), id.clone(), engine);
//! saver.save("row-1200").await.unwrap();
//!
//! let stored = store.get_state(&id).await.unwrap();
//! assert_eq!(stored.checkpoint.as_deref(), Some("row-1200"));
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::TaskError;
use crate::store::TaskStateStorage;
use crate::types::{EngineId, TaskId};

/// Number of attempts a save makes when the record changes under it.
const SAVE_ATTEMPTS: usize = 3;

/// Persists checkpoint tokens into one task's record.
#[derive(Clone)]
pub struct CheckpointSaver {
    store: Arc<dyn TaskStateStorage>,
    task_id: TaskId,
    engine_id: EngineId,
}

impl CheckpointSaver {
    /// Creates a saver for `task_id` as run by `engine_id`.
    pub fn new(store: Arc<dyn TaskStateStorage>, task_id: TaskId, engine_id: EngineId) -> Self {
        Self {
            store,
            task_id,
            engine_id,
        }
    }

    /// Returns the task this saver writes to.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Returns the engine whose run this saver belongs to.
    pub fn engine_id(&self) -> &EngineId {
        &self.engine_id
    }

    /// Durably records `token` as the task's checkpoint.
    ///
    /// Only the checkpoint field changes, and only while the task is
    /// `Running` or `Paused` under this saver's engine. The save is a
    /// compare-and-swap on the record, retried a few times if a concurrent
    /// status write lands in between, so it never overwrites such a write
    /// with stale fields.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task does not exist.
    /// - [`TaskError::NotOwner`] if the task is no longer held by this engine.
    /// - [`TaskError::Conflict`] if the record kept changing across retries.
    /// - [`TaskError::Store`] on backend failures.
    pub async fn save(&self, token: impl Into<String>) -> Result<(), TaskError> {
        let token = token.into();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let state = self.store.get_state(&self.task_id).await?;
            if !state.status.holds_engine() || state.engine_id.as_ref() != Some(&self.engine_id) {
                tracing::warn!(
                    task_id = %self.task_id,
                    engine_id = %self.engine_id,
                    status = %state.status,
                    owner = state.engine_id.as_ref().map(EngineId::as_str),
                    "refusing checkpoint from an engine that no longer holds the task"
                );
                return Err(TaskError::NotOwner {
                    task_id: self.task_id.to_string(),
                    engine_id: self.engine_id.to_string(),
                    status: state.status,
                });
            }
            match self
                .store
                .update_state_if_current(state.with_checkpoint(token.clone()))
                .await
            {
                Ok(_) => {
                    tracing::debug!(task_id = %self.task_id, checkpoint = %token, "checkpoint saved");
                    return Ok(());
                },
                Err(TaskError::Conflict { .. }) if attempt < SAVE_ATTEMPTS => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Reads the most recently saved checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task does not exist.
    pub async fn last(&self) -> Result<Option<String>, TaskError> {
        Ok(self.store.get_state(&self.task_id).await?.checkpoint)
    }
}

impl fmt::Debug for CheckpointSaver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointSaver")
            .field("task_id", &self.task_id)
            .field("engine_id", &self.engine_id)
            .finish_non_exhaustive()
    }
}
