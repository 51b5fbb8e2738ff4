//! Configuration for the tiered cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stockflow_utils::AppConfig;
use stockflow_utils::config::parse_flag;

/// Which tiers to build and where they live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keep a fast in-process tier in front of the durable ones
    pub memory_enabled: bool,

    /// Maximum number of entries held in memory
    pub memory_capacity: usize,

    /// SQLite database backing the durable tier (`None` disables it)
    pub database_path: Option<PathBuf>,

    /// Root directory of the cold file tier (`None` disables it)
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Defaults rooted at the application data directory
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            memory_enabled: true,
            memory_capacity: 1024,
            database_path: Some(app.database_path()),
            cache_dir: Some(app.cache_dir()),
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    ///
    /// Recognized variables: `STOCKFLOW_CACHE_MEMORY_ENABLED`,
    /// `STOCKFLOW_CACHE_MEMORY_CAPACITY`, `STOCKFLOW_CACHE_DB` and
    /// `STOCKFLOW_CACHE_DIR` (an empty value disables that tier), on top of the
    /// `STOCKFLOW_DATA_DIR` based defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::from_app(&AppConfig::from_lookup(&lookup));
        let mut builder = Self::builder()
            .database_path(defaults.database_path)
            .cache_dir(defaults.cache_dir);

        if let Some(raw) = lookup("STOCKFLOW_CACHE_MEMORY_ENABLED") {
            let enabled = parse_flag(&raw).ok_or_else(|| {
                CacheError::ConfigError(format!("STOCKFLOW_CACHE_MEMORY_ENABLED: invalid flag '{raw}'"))
            })?;
            builder = builder.memory_enabled(enabled);
        }
        if let Some(raw) = lookup("STOCKFLOW_CACHE_MEMORY_CAPACITY") {
            let capacity = raw.trim().parse().map_err(|_| {
                CacheError::ConfigError(format!("STOCKFLOW_CACHE_MEMORY_CAPACITY: not a number '{raw}'"))
            })?;
            builder = builder.memory_capacity(capacity);
        }
        if let Some(raw) = lookup("STOCKFLOW_CACHE_DB") {
            builder = builder.database_path(non_empty_path(raw));
        }
        if let Some(raw) = lookup("STOCKFLOW_CACHE_DIR") {
            builder = builder.cache_dir(non_empty_path(raw));
        }

        builder.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.memory_enabled && self.memory_capacity == 0 {
            return Err(CacheError::ConfigError(
                "memory_capacity must be greater than 0".to_string(),
            ));
        }

        if !self.memory_enabled && self.database_path.is_none() && self.cache_dir.is_none() {
            return Err(CacheError::ConfigError(
                "at least one cache tier must be enabled".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_empty_path(raw: String) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

/// Builder for CacheConfig
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    memory_enabled: Option<bool>,
    memory_capacity: Option<usize>,
    database_path: Option<Option<PathBuf>>,
    cache_dir: Option<Option<PathBuf>>,
}

impl CacheConfigBuilder {
    /// Enable or disable the memory tier
    pub fn memory_enabled(mut self, enabled: bool) -> Self {
        self.memory_enabled = Some(enabled);
        self
    }

    /// Set the memory tier capacity
    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = Some(capacity);
        self
    }

    /// Set (or with `None`, disable) the SQLite tier
    pub fn database_path(mut self, path: Option<PathBuf>) -> Self {
        self.database_path = Some(path);
        self
    }

    /// Set (or with `None`, disable) the file tier
    pub fn cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<CacheConfig> {
        let defaults = CacheConfig::default();

        let config = CacheConfig {
            memory_enabled: self.memory_enabled.unwrap_or(defaults.memory_enabled),
            memory_capacity: self.memory_capacity.unwrap_or(defaults.memory_capacity),
            database_path: self.database_path.unwrap_or(defaults.database_path),
            cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
        };

        config.validate()?;
        Ok(config)
    }
}
