//! Configuration for the batching coordinator

use std::path::{Path, PathBuf};
use std::time::Duration;

use batchline_core::{
    DEFAULT_EVENTS_BEFORE_FLUSH, DEFAULT_FLUSH_INTERVAL, SizeStrategy, TimeStrategy, TriggerPolicy,
};
use batchline_storage::{RedbStoreConfig, validate_database_name};
use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Environment variable overriding [`CoordinatorConfig::size_threshold`]
pub const ENV_SIZE_THRESHOLD: &str = "BATCHLINE_SIZE_THRESHOLD";
/// Environment variable overriding [`CoordinatorConfig::time_interval_ms`]
pub const ENV_TIME_INTERVAL_MS: &str = "BATCHLINE_TIME_INTERVAL_MS";
/// Environment variable overriding [`CoordinatorConfig::database_name`]
pub const ENV_DATABASE_NAME: &str = "BATCHLINE_DATABASE_NAME";
/// Environment variable overriding [`CoordinatorConfig::data_dir`]
pub const ENV_DATA_DIR: &str = "BATCHLINE_DATA_DIR";

/// Configuration for a [`BatchCoordinator`](crate::BatchCoordinator)
///
/// Missing fields fall back to their defaults when deserializing, so a
/// TOML file only needs the values it changes:
///
/// ```toml
/// size_threshold = 50
/// time_interval_ms = 30000
/// database_name = "analytics"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Pending events that trigger a flush; also the maximum batch size
    pub size_threshold: usize,
    /// Time between flushes, in milliseconds
    pub time_interval_ms: u64,
    /// Name of the queue on disk
    pub database_name: String,
    /// Directory holding the queue database
    pub data_dir: PathBuf,
    /// Capacity of the notification broadcast channel
    pub event_channel_capacity: usize,
    /// Log per-operation details at `debug` instead of `trace`
    pub debug_enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_EVENTS_BEFORE_FLUSH,
            time_interval_ms: DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
            database_name: "batchline".to_string(),
            data_dir: PathBuf::from("./data"),
            event_channel_capacity: 1024,
            debug_enabled: false,
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the size threshold
    pub fn with_size_threshold(mut self, size_threshold: usize) -> Self {
        self.size_threshold = size_threshold;
        self
    }

    /// Set the flush interval
    pub fn with_time_interval(mut self, interval: Duration) -> Self {
        self.time_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the database name
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Set the notification channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Enable or disable debug-level operation logs
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    /// Flush interval as a [`Duration`]
    pub fn time_interval(&self) -> Duration {
        Duration::from_millis(self.time_interval_ms)
    }

    /// Trigger policy described by this configuration
    pub fn trigger_policy(&self) -> TriggerPolicy {
        TriggerPolicy::new(
            SizeStrategy::new(self.size_threshold),
            TimeStrategy::new(self.time_interval()),
        )
    }

    /// Store configuration for the on-disk queue
    pub fn store_config(&self) -> RedbStoreConfig {
        RedbStoreConfig::new(&self.data_dir, &self.database_name)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> CoordinatorResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> CoordinatorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Override fields from `BATCHLINE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> CoordinatorResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable lookup
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> CoordinatorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_SIZE_THRESHOLD) {
            self.size_threshold = parse_number(ENV_SIZE_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_TIME_INTERVAL_MS) {
            self.time_interval_ms = parse_number(ENV_TIME_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_DATABASE_NAME) {
            self.database_name = value;
        }
        if let Some(value) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(value);
        }
        Ok(())
    }

    /// Check that the configuration can drive a coordinator
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.size_threshold == 0 {
            return Err(CoordinatorError::config("size_threshold must be at least 1"));
        }
        if self.time_interval_ms == 0 {
            return Err(CoordinatorError::config("time_interval_ms must be positive"));
        }
        if self.event_channel_capacity == 0 {
            return Err(CoordinatorError::config(
                "event_channel_capacity must be at least 1",
            ));
        }
        validate_database_name(&self.database_name)
            .map_err(|e| CoordinatorError::config(e.to_string()))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> CoordinatorResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CoordinatorError::config(format!("{}={:?}: {}", key, value, e)))
}
