//! Configuration management utilities

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Process-wide configuration shared by the pipeline and the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for everything stockflow persists
    pub data_dir: PathBuf,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            data_dir: lookup("STOCKFLOW_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            environment: lookup("STOCKFLOW_ENV").unwrap_or(defaults.environment),
            log_format: lookup("STOCKFLOW_LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
        }
    }

    /// Directory holding the file cache tier
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Directory holding file-backed progress records
    pub fn progress_dir(&self) -> PathBuf {
        self.data_dir.join("progress")
    }

    /// Path of the shared SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("stockflow.db")
    }
}

/// Interpret common truthy spellings of a flag variable
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.cache_dir(), PathBuf::from("./data/cache"));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("STOCKFLOW_DATA_DIR", "/var/lib/stockflow"),
            ("STOCKFLOW_ENV", "production"),
            ("STOCKFLOW_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.environment, "production");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/stockflow/stockflow.db")
        );
    }

    #[test]
    fn test_unknown_log_format_falls_back() {
        let config = AppConfig::from_lookup(|k| {
            (k == "STOCKFLOW_LOG_FORMAT").then(|| "xml".to_string())
        });
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
