//! Low-level storage backend trait and supporting types.
//!
//! The [`StorageBackend`] trait defines the contract that all storage engines
//! implement: versioned key-value records plus equality indexes over a fixed
//! set of fields. It exposes five operations: [`get`](StorageBackend::get),
//! [`insert`](StorageBackend::insert), [`put`](StorageBackend::put),
//! [`put_if_version`](StorageBackend::put_if_version) and
//! [`scan`](StorageBackend::scan).
//!
//! Domain logic (validation, immutable-field checks, claim rules,
//! serialization, pagination) does **not** belong here. Backends are dumb
//! stores; domain logic lives in
//! [`GenericTaskStateStore`](crate::store::generic::GenericTaskStateStore).
//!
//! # Keys
//!
//! Keys are task IDs, stored and returned verbatim.
//!
//! # Versioning and ordering
//!
//! Each stored record carries a monotonic `u64` version starting at 1 and
//! incremented on every successful write, and a creation `sequence` that is
//! assigned once on insert and never changes. `scan` returns records in
//! ascending sequence order, which gives queries a stable total order.
//!
//! # Atomicity
//!
//! A write replaces the record bytes and the record's index entries as one
//! unit. Readers must never observe one without the other.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// A record field that backends maintain an equality index for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexField {
    /// The task's lifecycle status.
    Status,
    /// The task class key.
    TaskClass,
    /// The creating actor.
    Creator,
    /// The engine the task is attributed to.
    EngineId,
}

impl IndexField {
    /// Stable name of the field, usable as part of a physical index key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::TaskClass => "taskClass",
            Self::Creator => "creator",
            Self::EngineId => "engineId",
        }
    }
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(field, value)` pair a record is indexed under.
///
/// # Examples
///
/// ```
/// use engine_tasks::store::backend::{IndexEntry, IndexField};
///
/// let entry = IndexEntry::new(IndexField::Creator, "scheduler");
/// assert_eq!(entry.to_string(), "creator=scheduler");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry {
    /// The indexed field.
    pub field: IndexField,
    /// The exact field value.
    pub value: String,
}

impl IndexEntry {
    /// Creates an index entry.
    pub fn new(field: IndexField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

impl fmt::Display for IndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

/// A stored record with its version and creation sequence.
///
/// # Examples
///
/// ```
/// use engine_tasks::store::backend::VersionedRecord;
///
/// let record = VersionedRecord {
///     data: b"{}".to_vec(),
///     version: 1,
///     sequence: 7,
/// };
/// assert_eq!(record.version, 1);
/// ```
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    /// The serialized task state (canonical JSON).
    pub data: Vec<u8>,

    /// Monotonic version number. Starts at 1, increments on each write.
    pub version: u64,

    /// Creation order; assigned on insert and never changed.
    pub sequence: u64,
}

/// Errors that can occur during raw storage operations.
///
/// `GenericTaskStateStore` maps these to [`TaskError`](crate::error::TaskError)
/// variants before surfacing them to callers.
///
/// # Examples
///
/// ```
/// use engine_tasks::store::backend::StorageError;
///
/// let err = StorageError::VersionConflict {
///     key: "k".to_string(),
///     expected: 2,
///     actual: 3,
/// };
/// assert!(err.to_string().contains("expected 2"));
/// ```
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key was not found in storage.
    #[error("key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// An insert hit a key that already exists.
    #[error("key already exists: {key}")]
    AlreadyExists {
        /// The duplicate key.
        key: String,
    },

    /// A [`put_if_version`](StorageBackend::put_if_version) call found a
    /// different version than expected.
    #[error("version conflict on key {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// The key where the conflict occurred.
        key: String,
        /// The version the caller expected.
        expected: u64,
        /// The actual version found in storage.
        actual: u64,
    },

    /// An I/O or backend-specific error occurred.
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Versioned, indexed record storage for task states.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; several engines (or several tasks
/// of one engine) read and write concurrently.
///
/// # No Domain Logic
///
/// Backends must **never** interpret record bytes. They store what they are
/// given and index it under the entries they are given.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a record by key.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists for the given key.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError>;

    /// Stores a new record at version 1 and assigns its creation sequence.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AlreadyExists`] if the key is taken.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn insert(
        &self,
        key: &str,
        data: &[u8],
        index: &[IndexEntry],
    ) -> Result<u64, StorageError>;

    /// Replaces an existing record unconditionally and returns the new version.
    ///
    /// The record's previous index entries are replaced by `index`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists for the given key.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn put(&self, key: &str, data: &[u8], index: &[IndexEntry])
        -> Result<u64, StorageError>;

    /// Replaces an existing record only if its version equals `expected_version`.
    ///
    /// This is the compare-and-swap primitive behind claims and versioned
    /// updates.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no record exists for the given key.
    /// - [`StorageError::VersionConflict`] on a version mismatch.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        index: &[IndexEntry],
        expected_version: u64,
    ) -> Result<u64, StorageError>;

    /// Returns every record indexed under **all** of `filter`, in ascending
    /// creation sequence. An empty filter returns every record.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn scan(
        &self,
        filter: &[IndexEntry],
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError>;
}
