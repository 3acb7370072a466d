//! Engine task configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.engine-tasks.toml`), `[tasks]` table
//! 2. Environment variables (with `ENGINE_TASKS_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [tasks.store]
//! optimistic_versioning = true
//! max_page_size = 500
//! clamp_unbounded = true
//!
//! [tasks.post_processing]
//! delay_ms = 30000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_POST_PROCESSING_DELAY_MS, ENV_MAX_PAGE_SIZE,
    ENV_OPTIMISTIC_VERSIONING, ENV_POST_PROCESSING_DELAY_MS,
};
use crate::store::StoreConfig;

/// Top-level configuration for the task core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTasksConfig {
    /// Storage behaviour.
    pub store: StoreConfig,

    /// Post-processing debounce.
    pub post_processing: PostProcessingConfig,
}

/// Post-processing debounce settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessingConfig {
    /// Idle time, in milliseconds, required since the last activity.
    pub delay_ms: u64,
}

impl Default for PostProcessingConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_POST_PROCESSING_DELAY_MS,
        }
    }
}

impl PostProcessingConfig {
    /// The configured delay as the gate's idle threshold.
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl EngineTasksConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `.engine-tasks.toml` in the working directory
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the file exists but is malformed and
    /// [`ConfigError::Io`] if it exists but cannot be read.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_optional_file(CONFIG_FILE_NAME)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults (plus environment overrides) instead of an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for read failures other than a missing
    /// file and [`ConfigError::Parse`] if the file is malformed.
    pub fn from_optional_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.as_ref().display().to_string(),
                    error: e.to_string(),
                })
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is malformed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from the `[tasks]` table of TOML content.
    ///
    /// A missing table yields the defaults. Environment overrides are not
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or mistyped fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use engine_tasks::config::EngineTasksConfig;
    ///
    /// let config = EngineTasksConfig::from_toml(
    ///     r#"
    ///     [tasks.post_processing]
    ///     delay_ms = 250
    ///     "#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.post_processing.delay_ms, 250);
    /// assert!(!config.store.optimistic_versioning);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            tasks: EngineTasksConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.tasks)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparsable values are logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_override(&lookup, ENV_POST_PROCESSING_DELAY_MS) {
            self.post_processing.delay_ms = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_OPTIMISTIC_VERSIONING) {
            self.store.optimistic_versioning = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_PAGE_SIZE) {
            self.store.max_page_size = v;
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable config override");
            None
        },
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading configuration file.
    #[error("failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },

    /// Parse error in configuration.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineTasksConfig::default();
        assert_eq!(config.post_processing.delay_ms, 60_000);
        assert_eq!(
            config.post_processing.idle_threshold(),
            Duration::from_secs(60)
        );
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_from_toml_partial_tables() {
        let config = EngineTasksConfig::from_toml(
            r#"
            [tasks.store]
            optimistic_versioning = true
            "#,
        )
        .unwrap();
        assert!(config.store.optimistic_versioning);
        assert_eq!(config.store.max_page_size, 10_000);
        assert_eq!(config.post_processing.delay_ms, 60_000);
    }

    #[test]
    fn test_other_tables_are_ignored() {
        let config = EngineTasksConfig::from_toml("[server]\nport = 4567\n").unwrap();
        assert_eq!(config, EngineTasksConfig::default());
    }

    #[test]
    fn test_mistyped_field_is_parse_error() {
        let err = EngineTasksConfig::from_toml("[tasks.post_processing]\ndelay_ms = \"soon\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides_win_and_bad_values_are_skipped() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_POST_PROCESSING_DELAY_MS, "1500"),
            (ENV_OPTIMISTIC_VERSIONING, "true"),
            (ENV_MAX_PAGE_SIZE, "lots"),
        ]);
        let mut config = EngineTasksConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.post_processing.delay_ms, 1500);
        assert!(config.store.optimistic_versioning);
        assert_eq!(config.store.max_page_size, 10_000);
    }
}
