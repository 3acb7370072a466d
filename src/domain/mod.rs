//! Domain types for internal task representation.
//!
//! - [`TaskState`] - The durable record storage persists and indexes.

pub mod state;

pub use state::TaskState;
