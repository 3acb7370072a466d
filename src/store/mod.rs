//! Task state storage trait, generic implementation, and supporting types.
//!
//! # Architecture
//!
//! The storage system has three layers:
//!
//! 1. **[`TaskStateStorage`]** -- The interface callers use, typically as
//!    `Arc<dyn TaskStateStorage>`. This is the single source of truth for
//!    task ownership.
//!
//! 2. **[`GenericTaskStateStore<B>`](generic::GenericTaskStateStore)** -- All
//!    domain logic (validation, immutable-field checks, canonical
//!    serialization, predicate re-check, ordering, pagination, CAS claims).
//!    Implements `TaskStateStorage`.
//!
//! 3. **[`StorageBackend`]** -- Versioned, indexed record storage that
//!    backends implement. No domain logic.
//!
//! # Backends
//!
//! - [`InMemoryBackend`](crate::store::memory::InMemoryBackend) -- In-process
//!   backend guarded by a single read-write lock. Used by
//!   [`InMemoryTaskStateStore`](crate::store::memory::InMemoryTaskStateStore).
//!
//! # Supporting Types
//!
//! - [`StoreConfig`] - Versioning and page-size settings.
//! - [`TaskQuery`] - Conjunctive filter plus `limit`/`offset` window.

pub mod backend;
pub mod generic;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use backend::{IndexEntry, IndexField, StorageBackend, StorageError, VersionedRecord};

use crate::constants::DEFAULT_MAX_PAGE_SIZE;
use crate::domain::TaskState;
use crate::error::TaskError;
use crate::types::{EngineId, TaskId, TaskStatus};

/// Storage-level settings.
///
/// # Defaults
///
/// | Setting                 | Default | Description                                      |
/// |-------------------------|---------|--------------------------------------------------|
/// | `optimistic_versioning` | false   | Reject `update_state` built from a stale read    |
/// | `max_page_size`         | 10,000  | Upper bound applied when `clamp_unbounded` is on |
/// | `clamp_unbounded`       | false   | Clamp `limit = 0` and oversized limits           |
///
/// # Examples
///
/// ```
/// use engine_tasks::store::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert!(!config.optimistic_versioning);
/// assert_eq!(config.effective_limit(0), None);
///
/// let clamped = StoreConfig {
///     clamp_unbounded: true,
///     max_page_size: 50,
///     ..StoreConfig::default()
/// };
/// assert_eq!(clamped.effective_limit(0), Some(50));
/// assert_eq!(clamped.effective_limit(10), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// When `true`, [`TaskStateStorage::update_state`] compares the state's
    /// `version` with the stored one and fails with
    /// [`TaskError::Conflict`] on mismatch. When `false`, updates are
    /// last-writer-wins.
    pub optimistic_versioning: bool,

    /// Largest page returned when `clamp_unbounded` is set.
    pub max_page_size: usize,

    /// Whether to cap unbounded (`limit = 0`) and oversized queries at
    /// `max_page_size`.
    pub clamp_unbounded: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            optimistic_versioning: false,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            clamp_unbounded: false,
        }
    }
}

impl StoreConfig {
    /// Resolves a requested `limit` into the number of records to return.
    ///
    /// `None` means unbounded.
    pub fn effective_limit(&self, limit: usize) -> Option<usize> {
        match (limit, self.clamp_unbounded) {
            (0, false) => None,
            (0, true) => Some(self.max_page_size),
            (n, true) => Some(n.min(self.max_page_size)),
            (n, false) => Some(n),
        }
    }
}

/// Conjunctive query over task states with an offset/limit window.
///
/// Unset predicates are not filtered on. `limit = 0` means unbounded.
/// Results come back in a stable order (creation sequence, then ID), so
/// disjoint windows over unchanged data return disjoint results.
///
/// # Examples
///
/// ```
/// use engine_tasks::store::TaskQuery;
/// use engine_tasks::TaskStatus;
///
/// let query = TaskQuery::new()
///     .status(TaskStatus::Scheduled)
///     .task_class("post-processing")
///     .limit(5)
///     .offset(10);
/// assert_eq!(query.status, Some(TaskStatus::Scheduled));
/// assert_eq!(query.limit, 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    /// Match tasks in exactly this status.
    pub status: Option<TaskStatus>,

    /// Match tasks of exactly this class.
    pub task_class: Option<String>,

    /// Match tasks created by exactly this actor.
    pub creator: Option<String>,

    /// Match tasks attributed to exactly this engine.
    pub engine_id: Option<EngineId>,

    /// Maximum number of results; `0` for unbounded.
    pub limit: usize,

    /// Number of matching results to skip.
    pub offset: usize,
}

impl TaskQuery {
    /// An unfiltered, unbounded query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters on status.
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters on task class.
    pub fn task_class(mut self, task_class: impl Into<String>) -> Self {
        self.task_class = Some(task_class.into());
        self
    }

    /// Filters on creator.
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    /// Filters on the attributed engine.
    pub fn engine_id(mut self, engine_id: EngineId) -> Self {
        self.engine_id = Some(engine_id);
        self
    }

    /// Sets the page size; `0` for unbounded.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the number of matches to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Index entries a backend can use to narrow the candidate set.
    pub fn index_filter(&self) -> Vec<IndexEntry> {
        let mut filter = Vec::new();
        if let Some(status) = self.status {
            filter.push(IndexEntry::new(IndexField::Status, status.as_str()));
        }
        if let Some(task_class) = &self.task_class {
            filter.push(IndexEntry::new(IndexField::TaskClass, task_class.as_str()));
        }
        if let Some(creator) = &self.creator {
            filter.push(IndexEntry::new(IndexField::Creator, creator.as_str()));
        }
        if let Some(engine_id) = &self.engine_id {
            filter.push(IndexEntry::new(IndexField::EngineId, engine_id.as_str()));
        }
        filter
    }

    /// Returns `true` if `state` satisfies every set predicate.
    pub fn matches(&self, state: &TaskState) -> bool {
        self.status.is_none_or(|s| state.status == s)
            && self
                .task_class
                .as_deref()
                .is_none_or(|c| state.task_class == c)
            && self.creator.as_deref().is_none_or(|c| state.creator == c)
            && self
                .engine_id
                .as_ref()
                .is_none_or(|e| state.engine_id.as_ref() == Some(e))
    }
}

/// Persistence and query interface for task states.
///
/// [`GenericTaskStateStore<B>`](generic::GenericTaskStateStore) implements
/// this for every backend; wrap it in `Arc<dyn TaskStateStorage>` to share it
/// between the runner, checkpoint savers and the external scheduler.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Every operation returns promptly;
/// none of them wait on task execution.
///
/// # Ownership
///
/// `update_state` is last-writer-wins unless
/// [`StoreConfig::optimistic_versioning`] is on. Exclusive execution is
/// guaranteed by [`claim`](TaskStateStorage::claim), which always uses
/// compare-and-swap.
#[async_trait]
pub trait TaskStateStorage: Send + Sync {
    /// Persists a new task state and returns its freshly assigned ID.
    ///
    /// The record is stored exactly as given, plus the ID, and indexed by
    /// status, task class, creator and engine.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Validation`] if the schedule is malformed, a required
    ///   field is empty, the state already has an ID, or the status
    ///   invariants are violated.
    /// - [`TaskError::Store`] on backend failures.
    async fn new_state(&self, state: TaskState) -> Result<TaskId, TaskError>;

    /// Retrieves a task state by ID.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if no record exists for the ID.
    /// - [`TaskError::Store`] on backend failures.
    async fn get_state(&self, id: &TaskId) -> Result<TaskState, TaskError>;

    /// Replaces the stored record wholesale.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the ID is unknown (never creates a record).
    /// - [`TaskError::Validation`] if the state has no ID, changes an
    ///   immutable field, or violates the status invariants.
    /// - [`TaskError::Conflict`] if optimistic versioning is on and the
    ///   state's version is stale.
    /// - [`TaskError::Store`] on backend failures.
    async fn update_state(&self, state: TaskState) -> Result<(), TaskError>;

    /// Replaces the stored record only if it is still at `state.version`.
    ///
    /// Same as [`update_state`](TaskStateStorage::update_state) with
    /// versioning forced on. Returns the state with its new version.
    ///
    /// # Errors
    ///
    /// As for `update_state`, with [`TaskError::Conflict`] on any stale write.
    async fn update_state_if_current(&self, state: TaskState) -> Result<TaskState, TaskError>;

    /// Claims a `Scheduled` task for `engine_id`, moving it to `Running`.
    ///
    /// The read and the conditional write are one compare-and-swap, so of
    /// several concurrent claimers at most one succeeds.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the ID is unknown.
    /// - [`TaskError::InvalidTransition`] if the task is not `Scheduled`.
    /// - [`TaskError::Conflict`] if the record changed during the claim.
    /// - [`TaskError::Store`] on backend failures.
    async fn claim(
        &self,
        id: &TaskId,
        engine_id: &EngineId,
        changed_by: &str,
    ) -> Result<TaskState, TaskError>;

    /// Returns the states matching every set predicate of `query`, windowed
    /// by `offset`/`limit` over a stable order.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    async fn get_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskState>, TaskError>;
}
