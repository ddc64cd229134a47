//! Configuration for the log core.
//!
//! [`Config::load`] reads a TOML file; missing keys take the values from
//! [`Config::default`].

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_TOPIC: &str = "/log";
pub const DEFAULT_TICK_MS: u64 = 100;
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Settings for one ingestion loop
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum number of records kept
    pub capacity: usize,

    /// Include pattern (empty = include everything)
    pub include: String,

    /// Exclude pattern (empty = exclude nothing)
    pub exclude: String,

    /// Treat both patterns as regular expressions
    pub use_regex: bool,

    /// Subscribe as soon as the loop is created
    pub enabled: bool,

    /// Topic to subscribe to
    pub topic: String,

    /// Period of the ingestion tick
    pub tick_ms: u64,

    /// Quiet time after a filter edit before the view is rebuilt
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            include: String::new(),
            exclude: String::new(),
            use_regex: false,
            enabled: true,
            topic: DEFAULT_TOPIC.to_string(),
            tick_ms: DEFAULT_TICK_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML config text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that cannot be repaired later
    pub fn validate(&self) -> Result<()> {
        validate_capacity(self.capacity)?;
        logpane_transport::validate_topic(&self.topic)?;
        if self.tick_ms == 0 {
            return Err(Error::Config("tick_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    /// The capacity as a validated non-zero value
    pub fn capacity(&self) -> Result<NonZeroUsize> {
        validate_capacity(self.capacity)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Convert a raw capacity, rejecting zero
pub fn validate_capacity(capacity: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(capacity).ok_or_else(|| {
        tracing::warn!(capacity, "rejected capacity");
        Error::InvalidCapacity(capacity)
    })
}
