//! Generic task state store with all domain logic delegating to a [`StorageBackend`].
//!
//! [`GenericTaskStateStore`] implements every domain operation (validation,
//! immutable-field enforcement, index derivation, canonical JSON
//! serialization, predicate re-check, stable ordering, pagination, CAS
//! claims) on top of any [`StorageBackend`] implementation.
//!
//! Backends remain dumb stores; all intelligence lives here.
//!
//! # Construction
//!
//! ```
//! use engine_tasks::store::generic::GenericTaskStateStore;
//! use engine_tasks::store::memory::InMemoryBackend;
//! use engine_tasks::store::StoreConfig;
//!
//! let store = GenericTaskStateStore::new(InMemoryBackend::new())
//!     .with_config(StoreConfig {
//!         optimistic_versioning: true,
//!         ..StoreConfig::default()
//!     });
//! assert!(store.config().optimistic_versioning);
//! ```
//!
//! # Query consistency
//!
//! Backends narrow candidates through their indexes, but every candidate is
//! decoded and re-checked against the query before it is returned. A stale
//! index entry can therefore never produce a wrong match.

use async_trait::async_trait;

use crate::domain::TaskState;
use crate::error::TaskError;
use crate::store::backend::{IndexEntry, IndexField, StorageBackend, StorageError};
use crate::store::{StoreConfig, TaskQuery, TaskStateStorage};
use crate::types::{EngineId, TaskId, TaskStatus};

/// Generic task state store that delegates all storage to a [`StorageBackend`].
///
/// # Type Parameters
///
/// * `B` - A [`StorageBackend`] implementation.
#[derive(Debug)]
pub struct GenericTaskStateStore<B: StorageBackend> {
    backend: B,
    config: StoreConfig,
}

impl<B: StorageBackend> GenericTaskStateStore<B> {
    /// Creates a new store backed by the given backend with default
    /// configuration (last-writer-wins updates, unbounded queries).
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: StoreConfig::default(),
        }
    }

    /// Sets the storage configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the storage configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ---- Serialization helpers (private) ----

    fn serialize_state(state: &TaskState) -> Result<Vec<u8>, TaskError> {
        serde_json::to_vec(state)
            .map_err(|e| TaskError::Store(format!("failed to serialize TaskState: {e}")))
    }

    fn deserialize_state(data: &[u8], version: u64) -> Result<TaskState, TaskError> {
        let mut state: TaskState = serde_json::from_slice(data)
            .map_err(|e| TaskError::Store(format!("failed to deserialize TaskState: {e}")))?;
        state.version = version;
        Ok(state)
    }

    fn map_storage_error(err: StorageError, task_id: &TaskId) -> TaskError {
        match err {
            StorageError::NotFound { .. } => TaskError::NotFound {
                task_id: task_id.to_string(),
            },
            StorageError::AlreadyExists { key } => {
                TaskError::Store(format!("task id collision on {key}"))
            },
            StorageError::VersionConflict {
                expected, actual, ..
            } => TaskError::Conflict {
                task_id: task_id.to_string(),
                expected_version: expected,
                actual_version: actual,
            },
            StorageError::Backend { message, .. } => TaskError::Store(message),
        }
    }

    /// Index entries for the state's current field values.
    fn index_entries(state: &TaskState) -> Vec<IndexEntry> {
        let mut entries = vec![
            IndexEntry::new(IndexField::Status, state.status.as_str()),
            IndexEntry::new(IndexField::TaskClass, state.task_class.as_str()),
            IndexEntry::new(IndexField::Creator, state.creator.as_str()),
        ];
        if let Some(engine_id) = &state.engine_id {
            entries.push(IndexEntry::new(IndexField::EngineId, engine_id.as_str()));
        }
        entries
    }

    /// Validates an update against the stored record and writes it.
    ///
    /// With `versioned` set, a stale `state.version` is rejected and the
    /// write is a compare-and-swap.
    async fn replace(
        &self,
        mut state: TaskState,
        versioned: bool,
    ) -> Result<TaskState, TaskError> {
        let id = state.require_id()?.clone();
        state.validate()?;

        let current = self.get_state(&id).await?;
        if !current.same_definition(&state) {
            return Err(TaskError::validation(format!(
                "task {id}: task class, creator, schedule and configuration are immutable"
            )));
        }
        if versioned && state.version != current.version {
            tracing::warn!(
                task_id = %id,
                expected_version = state.version,
                actual_version = current.version,
                "rejecting update built from a stale read"
            );
            return Err(TaskError::Conflict {
                task_id: id.to_string(),
                expected_version: state.version,
                actual_version: current.version,
            });
        }

        let bytes = Self::serialize_state(&state)?;
        let index = Self::index_entries(&state);
        let result = if versioned {
            self.backend
                .put_if_version(id.as_str(), &bytes, &index, current.version)
                .await
        } else {
            self.backend.put(id.as_str(), &bytes, &index).await
        };
        state.version = result.map_err(|e| Self::map_storage_error(e, &id))?;

        tracing::debug!(
            task_id = %id,
            status = %state.status,
            engine_id = state.engine_id.as_ref().map(EngineId::as_str),
            version = state.version,
            "task state updated"
        );
        Ok(state)
    }

    // ---- Domain operations (public) ----

    /// Persists a new state under a freshly generated ID.
    pub async fn new_state(&self, mut state: TaskState) -> Result<TaskId, TaskError> {
        if let Some(id) = &state.id {
            return Err(TaskError::validation(format!(
                "task state already has id {id}; ids are assigned by storage"
            )));
        }
        state.validate()?;

        let id = TaskId::generate();
        state.id = Some(id.clone());

        let bytes = Self::serialize_state(&state)?;
        let index = Self::index_entries(&state);
        self.backend
            .insert(id.as_str(), &bytes, &index)
            .await
            .map_err(|e| Self::map_storage_error(e, &id))?;

        tracing::debug!(
            task_id = %id,
            task_class = %state.task_class,
            creator = %state.creator,
            status = %state.status,
            "task state created"
        );
        Ok(id)
    }

    /// Retrieves a state by ID.
    pub async fn get_state(&self, id: &TaskId) -> Result<TaskState, TaskError> {
        let versioned = self
            .backend
            .get(id.as_str())
            .await
            .map_err(|e| Self::map_storage_error(e, id))?;
        Self::deserialize_state(&versioned.data, versioned.version)
    }

    /// Replaces a stored state, honouring [`StoreConfig::optimistic_versioning`].
    pub async fn update_state(&self, state: TaskState) -> Result<(), TaskError> {
        self.replace(state, self.config.optimistic_versioning)
            .await
            .map(|_| ())
    }

    /// Replaces a stored state only if it is still at `state.version`.
    pub async fn update_state_if_current(&self, state: TaskState) -> Result<TaskState, TaskError> {
        self.replace(state, true).await
    }

    /// Claims a `Scheduled` task for `engine_id` with a compare-and-swap.
    pub async fn claim(
        &self,
        id: &TaskId,
        engine_id: &EngineId,
        changed_by: &str,
    ) -> Result<TaskState, TaskError> {
        let current = self.get_state(id).await?;
        if current.status != TaskStatus::Scheduled {
            tracing::warn!(
                task_id = %id,
                status = %current.status,
                owner = current.engine_id.as_ref().map(EngineId::as_str),
                claimant = %engine_id,
                "refusing to claim task that is not scheduled"
            );
            return Err(TaskError::InvalidTransition {
                task_id: id.to_string(),
                from: current.status,
                to: TaskStatus::Running,
            });
        }

        let claimed = current
            .with_running(engine_id.clone())
            .with_status_changed_by(changed_by);
        let claimed = self.replace(claimed, true).await?;

        tracing::info!(task_id = %id, engine_id = %engine_id, "task claimed");
        Ok(claimed)
    }

    /// Returns matching states in creation order, windowed by the query.
    pub async fn get_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskState>, TaskError> {
        let candidates = self
            .backend
            .scan(&query.index_filter())
            .await
            .map_err(|e| TaskError::Store(e.to_string()))?;

        let mut matched = Vec::with_capacity(candidates.len());
        for (key, record) in candidates {
            let state = Self::deserialize_state(&record.data, record.version)?;
            if query.matches(&state) {
                matched.push((record.sequence, key, state));
            }
        }
        matched.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let page = matched.into_iter().skip(query.offset).map(|(_, _, s)| s);
        Ok(match self.config.effective_limit(query.limit) {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }
}

// ---- TaskStateStorage impl ----

#[async_trait]
impl<B: StorageBackend + 'static> TaskStateStorage for GenericTaskStateStore<B> {
    async fn new_state(&self, state: TaskState) -> Result<TaskId, TaskError> {
        GenericTaskStateStore::new_state(self, state).await
    }

    async fn get_state(&self, id: &TaskId) -> Result<TaskState, TaskError> {
        GenericTaskStateStore::get_state(self, id).await
    }

    async fn update_state(&self, state: TaskState) -> Result<(), TaskError> {
        GenericTaskStateStore::update_state(self, state).await
    }

    async fn update_state_if_current(&self, state: TaskState) -> Result<TaskState, TaskError> {
        GenericTaskStateStore::update_state_if_current(self, state).await
    }

    async fn claim(
        &self,
        id: &TaskId,
        engine_id: &EngineId,
        changed_by: &str,
    ) -> Result<TaskState, TaskError> {
        GenericTaskStateStore::claim(self, id, engine_id, changed_by).await
    }

    async fn get_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskState>, TaskError> {
        GenericTaskStateStore::get_tasks(self, query).await
    }
}
