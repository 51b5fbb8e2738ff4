//! Configuration for progress tracking

use crate::error::{ProgressError, Result};
use crate::store::{FileProgressStore, MemoryProgressStore, ProgressStore, SqliteProgressStore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stockflow_utils::AppConfig;

/// Where progress records are shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON file per analysis
    #[default]
    File,
    /// A table in the shared SQLite database
    Sqlite,
    /// Process-local only
    Memory,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "file" | "files" => Some(Self::File),
            "sqlite" | "db" => Some(Self::Sqlite),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Progress store location and observer timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    pub backend: StoreBackend,
    pub progress_dir: PathBuf,
    pub database_path: PathBuf,
    /// Delay between observer polls
    pub poll_interval: Duration,
    /// Observers give up after this long
    pub max_observation: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl ProgressConfig {
    pub fn builder() -> ProgressConfigBuilder {
        ProgressConfigBuilder::default()
    }

    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            backend: StoreBackend::File,
            progress_dir: app.progress_dir(),
            database_path: app.database_path(),
            poll_interval: Duration::from_secs(2),
            max_observation: Duration::from_secs(30 * 60),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary variable lookup
    ///
    /// Reads `STOCKFLOW_PROGRESS_BACKEND`, `STOCKFLOW_PROGRESS_DIR`,
    /// `STOCKFLOW_PROGRESS_DB`, `STOCKFLOW_PROGRESS_POLL_SECS` and
    /// `STOCKFLOW_PROGRESS_MAX_WAIT_SECS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::from_app(&AppConfig::from_lookup(&lookup));
        let mut builder = Self::builder()
            .progress_dir(defaults.progress_dir)
            .database_path(defaults.database_path);

        if let Some(raw) = lookup("STOCKFLOW_PROGRESS_BACKEND") {
            let backend = StoreBackend::parse(&raw).ok_or_else(|| {
                ProgressError::ConfigError(format!("STOCKFLOW_PROGRESS_BACKEND: unknown backend '{raw}'"))
            })?;
            builder = builder.backend(backend);
        }
        if let Some(raw) = lookup("STOCKFLOW_PROGRESS_DIR") {
            builder = builder.progress_dir(raw);
        }
        if let Some(raw) = lookup("STOCKFLOW_PROGRESS_DB") {
            builder = builder.database_path(raw);
        }
        if let Some(raw) = lookup("STOCKFLOW_PROGRESS_POLL_SECS") {
            builder = builder.poll_interval(parse_secs("STOCKFLOW_PROGRESS_POLL_SECS", &raw)?);
        }
        if let Some(raw) = lookup("STOCKFLOW_PROGRESS_MAX_WAIT_SECS") {
            builder = builder.max_observation(parse_secs("STOCKFLOW_PROGRESS_MAX_WAIT_SECS", &raw)?);
        }

        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(ProgressError::ConfigError(
                "poll_interval must be greater than 0".to_string(),
            ));
        }
        if self.max_observation < self.poll_interval {
            return Err(ProgressError::ConfigError(
                "max_observation must be at least one poll_interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the configured store
    pub fn open_store(&self) -> Result<Arc<dyn ProgressStore>> {
        let store: Arc<dyn ProgressStore> = match self.backend {
            StoreBackend::File => Arc::new(FileProgressStore::open(&self.progress_dir)?),
            StoreBackend::Sqlite => Arc::new(SqliteProgressStore::open(&self.database_path)?),
            StoreBackend::Memory => Arc::new(MemoryProgressStore::new()),
        };
        Ok(store)
    }
}

fn parse_secs(var: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ProgressError::ConfigError(format!("{var}: not a duration in seconds '{raw}'")))
}

/// Builder for ProgressConfig
#[derive(Debug, Default)]
pub struct ProgressConfigBuilder {
    backend: Option<StoreBackend>,
    progress_dir: Option<PathBuf>,
    database_path: Option<PathBuf>,
    poll_interval: Option<Duration>,
    max_observation: Option<Duration>,
}

impl ProgressConfigBuilder {
    pub fn backend(mut self, backend: StoreBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn progress_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.progress_dir = Some(dir.into());
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_observation(mut self, limit: Duration) -> Self {
        self.max_observation = Some(limit);
        self
    }

    pub fn build(self) -> Result<ProgressConfig> {
        let defaults = ProgressConfig::default();

        let config = ProgressConfig {
            backend: self.backend.unwrap_or(defaults.backend),
            progress_dir: self.progress_dir.unwrap_or(defaults.progress_dir),
            database_path: self.database_path.unwrap_or(defaults.database_path),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            max_observation: self.max_observation.unwrap_or(defaults.max_observation),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert_eq!(config.backend, StoreBackend::File);
        assert_eq!(config.progress_dir, PathBuf::from("./data/progress"));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.max_observation, Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = ProgressConfig::from_lookup(lookup(&[
            ("STOCKFLOW_DATA_DIR", "/srv/stockflow"),
            ("STOCKFLOW_PROGRESS_BACKEND", "SQLite"),
            ("STOCKFLOW_PROGRESS_POLL_SECS", "0.5"),
        ]))
        .unwrap();

        assert_eq!(config.backend, StoreBackend::Sqlite);
        assert_eq!(config.database_path, PathBuf::from("/srv/stockflow/stockflow.db"));
        assert_eq!(config.progress_dir, PathBuf::from("/srv/stockflow/progress"));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_BACKEND", "redis")])).is_err());
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_POLL_SECS", "soon")])).is_err());
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_POLL_SECS", "0")])).is_err());
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_POLL_SECS", "-1")])).is_err());
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_POLL_SECS", "inf")])).is_err());
        // rounds to a zero interval
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_POLL_SECS", "1e-12")])).is_err());
        // beyond what a Duration can hold
        assert!(ProgressConfig::from_lookup(lookup(&[("STOCKFLOW_PROGRESS_MAX_WAIT_SECS", "1e30")])).is_err());
    }

    #[test]
    fn test_validation_window() {
        let result = ProgressConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .max_observation(Duration::from_secs(5))
            .build();
        assert!(matches!(result, Err(ProgressError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_open_store() {
        let dir = TempDir::new().unwrap();
        let config = ProgressConfig::builder()
            .progress_dir(dir.path().join("progress"))
            .build()
            .unwrap();
        let store = config.open_store().unwrap();
        assert_eq!(store.name(), "file");
        assert!(dir.path().join("progress").is_dir());

        let config = ProgressConfig::builder()
            .backend(StoreBackend::Sqlite)
            .database_path(dir.path().join("db").join("stockflow.db"))
            .build()
            .unwrap();
        assert_eq!(config.open_store().unwrap().name(), "sqlite");
    }
}
