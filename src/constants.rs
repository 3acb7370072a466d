//! Default values and environment variable names.

/// Configuration file read by [`EngineTasksConfig::load`](crate::config::EngineTasksConfig::load).
pub const CONFIG_FILE_NAME: &str = ".engine-tasks.toml";

/// Default idle time before post-processing may run, in milliseconds.
pub const DEFAULT_POST_PROCESSING_DELAY_MS: u64 = 60_000;

/// Default page size cap applied when unbounded queries are clamped.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;

/// Overrides `post_processing.delay_ms`.
pub const ENV_POST_PROCESSING_DELAY_MS: &str = "ENGINE_TASKS_POST_PROCESSING_DELAY_MS";

/// Overrides `store.optimistic_versioning`.
pub const ENV_OPTIMISTIC_VERSIONING: &str = "ENGINE_TASKS_OPTIMISTIC_VERSIONING";

/// Overrides `store.max_page_size`.
pub const ENV_MAX_PAGE_SIZE: &str = "ENGINE_TASKS_MAX_PAGE_SIZE";
