//! In-memory storage backend and task state store.
//!
//! [`InMemoryBackend`] provides a thread-safe [`StorageBackend`] that keeps
//! records, their creation order and their index postings behind a single
//! [`parking_lot::RwLock`]. A write swaps the record bytes and the index
//! postings under one write guard, so readers never observe a record without
//! its index entries or the reverse.
//!
//! [`InMemoryTaskStateStore`] is a thin wrapper around
//! [`GenericTaskStateStore<InMemoryBackend>`](crate::store::generic::GenericTaskStateStore)
//! with a zero-argument constructor, builder methods, and a `Default` impl.
//!
//! # Examples
//!
//! ```
//! use engine_tasks::store::memory::InMemoryTaskStateStore;
//! use engine_tasks::store::StoreConfig;
//!
//! let store = InMemoryTaskStateStore::new().with_config(StoreConfig {
//!     optimistic_versioning: true,
//!     ..StoreConfig::default()
//! });
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::TaskState;
use crate::error::TaskError;
use crate::store::backend::{IndexEntry, StorageBackend, StorageError, VersionedRecord};
use crate::store::generic::GenericTaskStateStore;
use crate::types::{EngineId, TaskId};

use super::{StoreConfig, TaskQuery, TaskStateStorage};

// ---- InMemoryBackend: versioned records plus index postings ----

#[derive(Debug)]
struct StoredEntry {
    data: Vec<u8>,
    version: u64,
    sequence: u64,
    index: Vec<IndexEntry>,
}

impl StoredEntry {
    fn to_record(&self) -> VersionedRecord {
        VersionedRecord {
            data: self.data.clone(),
            version: self.version,
            sequence: self.sequence,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, StoredEntry>,
    by_sequence: BTreeMap<u64, String>,
    postings: HashMap<IndexEntry, BTreeSet<u64>>,
    next_sequence: u64,
}

impl MemoryState {
    fn unindex(&mut self, sequence: u64, index: &[IndexEntry]) {
        for entry in index {
            if let Some(posting) = self.postings.get_mut(entry) {
                posting.remove(&sequence);
                if posting.is_empty() {
                    self.postings.remove(entry);
                }
            }
        }
    }

    fn index(&mut self, sequence: u64, index: &[IndexEntry]) {
        for entry in index {
            self.postings
                .entry(entry.clone())
                .or_default()
                .insert(sequence);
        }
    }

    fn replace(&mut self, key: &str, data: &[u8], index: &[IndexEntry]) -> u64 {
        let Some(entry) = self.records.get_mut(key) else {
            return 0;
        };
        let sequence = entry.sequence;
        let old_index = std::mem::replace(&mut entry.index, index.to_vec());
        entry.data = data.to_vec();
        entry.version += 1;
        let version = entry.version;

        self.unindex(sequence, &old_index);
        self.index(sequence, index);
        version
    }

    /// Sequences indexed under every entry of `filter`, ascending.
    fn matching_sequences(&self, filter: &[IndexEntry]) -> Vec<u64> {
        if filter.is_empty() {
            return self.by_sequence.keys().copied().collect();
        }

        let mut postings = Vec::with_capacity(filter.len());
        for entry in filter {
            match self.postings.get(entry) {
                Some(posting) => postings.push(posting),
                None => return Vec::new(),
            }
        }
        postings.sort_by_key(|p| p.len());

        let Some((smallest, rest)) = postings.split_first() else {
            return Vec::new();
        };
        smallest
            .iter()
            .copied()
            .filter(|seq| rest.iter().all(|p| p.contains(seq)))
            .collect()
    }
}

/// Thread-safe in-memory storage backend.
///
/// Records are kept as serialized bytes with a version and creation
/// sequence, alongside posting sets per [`IndexEntry`]. This backend
/// contains **no domain logic**.
///
/// # Examples
///
/// ```
/// use engine_tasks::store::memory::InMemoryBackend;
/// use engine_tasks::store::generic::GenericTaskStateStore;
///
/// let backend = InMemoryBackend::new();
/// assert!(backend.is_empty());
/// let store = GenericTaskStateStore::new(backend);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<MemoryState>,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records stored.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Returns `true` if the backend contains no records.
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        self.state
            .read()
            .records
            .get(key)
            .map(StoredEntry::to_record)
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn insert(
        &self,
        key: &str,
        data: &[u8],
        index: &[IndexEntry],
    ) -> Result<u64, StorageError> {
        let mut state = self.state.write();
        if state.records.contains_key(key) {
            return Err(StorageError::AlreadyExists {
                key: key.to_string(),
            });
        }

        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.records.insert(
            key.to_string(),
            StoredEntry {
                data: data.to_vec(),
                version: 1,
                sequence,
                index: index.to_vec(),
            },
        );
        state.by_sequence.insert(sequence, key.to_string());
        state.index(sequence, index);
        Ok(1)
    }

    async fn put(
        &self,
        key: &str,
        data: &[u8],
        index: &[IndexEntry],
    ) -> Result<u64, StorageError> {
        let mut state = self.state.write();
        if !state.records.contains_key(key) {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(state.replace(key, data, index))
    }

    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        index: &[IndexEntry],
        expected_version: u64,
    ) -> Result<u64, StorageError> {
        let mut state = self.state.write();
        let current_version = state
            .records
            .get(key)
            .map(|entry| entry.version)
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        if current_version != expected_version {
            return Err(StorageError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
                actual: current_version,
            });
        }
        Ok(state.replace(key, data, index))
    }

    async fn scan(
        &self,
        filter: &[IndexEntry],
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
        let state = self.state.read();
        let results = state
            .matching_sequences(filter)
            .into_iter()
            .filter_map(|seq| {
                let key = state.by_sequence.get(&seq)?;
                let entry = state.records.get(key)?;
                Some((key.clone(), entry.to_record()))
            })
            .collect();
        Ok(results)
    }
}

// ---- InMemoryTaskStateStore: thin wrapper around GenericTaskStateStore<InMemoryBackend> ----

/// In-process task state store using [`GenericTaskStateStore`] with [`InMemoryBackend`].
///
/// Suitable for a single engine process and for tests. All domain logic is
/// delegated to the generic store.
#[derive(Debug)]
pub struct InMemoryTaskStateStore {
    inner: GenericTaskStateStore<InMemoryBackend>,
}

impl InMemoryTaskStateStore {
    /// Creates a new in-memory store with default configuration.
    pub fn new() -> Self {
        Self {
            inner: GenericTaskStateStore::new(InMemoryBackend::new()),
        }
    }

    /// Sets the storage configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.inner = self.inner.with_config(config);
        self
    }

    /// Returns the storage configuration.
    pub fn config(&self) -> &StoreConfig {
        self.inner.config()
    }

    /// Returns the number of stored task states.
    pub fn len(&self) -> usize {
        self.inner.backend().len()
    }

    /// Returns `true` if no task state has been stored.
    pub fn is_empty(&self) -> bool {
        self.inner.backend().is_empty()
    }
}

impl Default for InMemoryTaskStateStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---- TaskStateStorage delegation impl ----

#[async_trait]
impl TaskStateStorage for InMemoryTaskStateStore {
    async fn new_state(&self, state: TaskState) -> Result<TaskId, TaskError> {
        self.inner.new_state(state).await
    }

    async fn get_state(&self, id: &TaskId) -> Result<TaskState, TaskError> {
        self.inner.get_state(id).await
    }

    async fn update_state(&self, state: TaskState) -> Result<(), TaskError> {
        self.inner.update_state(state).await
    }

    async fn update_state_if_current(&self, state: TaskState) -> Result<TaskState, TaskError> {
        self.inner.update_state_if_current(state).await
    }

    async fn claim(
        &self,
        id: &TaskId,
        engine_id: &EngineId,
        changed_by: &str,
    ) -> Result<TaskState, TaskError> {
        self.inner.claim(id, engine_id, changed_by).await
    }

    async fn get_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskState>, TaskError> {
        self.inner.get_tasks(query).await
    }
}
