//! Background task scheduling core for a distributed graph engine.
//!
//! This crate holds the durable task-state model, the status state machine,
//! the storage contract that indexes and serves task states to several
//! engine processes at once, and the debounced trigger policy for deferred
//! maintenance work.
//!
//! # Overview
//!
//! A task is a [`TaskState`] record: a task class key, its creator, a
//! [`TaskSchedule`], an opaque [`Configuration`], and lifecycle fields. Its
//! status moves through a fixed state machine:
//!
//! ```text
//! CREATED -> SCHEDULED -> RUNNING <-> PAUSED -> { COMPLETED, FAILED, STOPPED }
//! ```
//!
//! `SCHEDULED -> RUNNING` is the claim. It records the claiming engine's
//! [`EngineId`] and is a compare-and-swap, so of several engines racing for
//! one task at most one wins.
//!
//! Deciding *which* task to run next is left to an external scheduler. It
//! queries [`TaskStateStorage`](store::TaskStateStorage) and hands the chosen
//! task to a [`TaskRunner`](task::TaskRunner).
//!
//! # Module Organization
//!
//! - [`types`] - Identifiers, schedule and status
//! - [`domain`] - The persisted [`TaskState`] record
//! - [`store`] - Storage trait, generic store, in-memory backend
//! - [`task`] - Task capability, registry, checkpoints, runner
//! - [`postprocessing`] - Activity tracking and the debounce gate
//! - [`config`] - TOML and environment configuration
//! - [`error`] - Error types
//! - [`constants`] - Defaults and environment variable names
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use engine_tasks::store::memory::InMemoryTaskStateStore;
//! use engine_tasks::store::{TaskQuery, TaskStateStorage};
//! use engine_tasks::{Configuration, TaskSchedule, TaskState, TaskStatus};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(InMemoryTaskStateStore::new());
//! let state = TaskState::new("post-processing", "engine", TaskSchedule::now(), Configuration::new());
//! let id = store.new_state(state).await.unwrap();
//!
//! let created = store
//!     .get_tasks(&TaskQuery::new().status(TaskStatus::Created))
//!     .await
//!     .unwrap();
//! assert_eq!(created[0].id.as_ref(), Some(&id));
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod postprocessing;
pub mod store;
pub mod task;
pub mod types;

pub use config::{ConfigError, EngineTasksConfig, PostProcessingConfig};
pub use domain::TaskState;
pub use error::{TaskError, TaskErrorKind};
pub use store::{StoreConfig, TaskQuery, TaskStateStorage};
pub use task::{BackgroundTask, CheckpointSaver, TaskOutcome, TaskRegistry, TaskRunner};
pub use types::{Configuration, EngineId, TaskId, TaskSchedule, TaskStatus};
