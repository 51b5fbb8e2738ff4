//! Error types for cache operations

use stockflow_utils::BackendError;
use thiserror::Error;

/// Cache construction and administration errors
///
/// Lookups and writes never surface these: a failing tier degrades to a miss
/// or a skipped write inside the manager.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unknown data type name
    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// A storage tier could not be opened or queried
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::ConfigError("memory_capacity must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: memory_capacity must be greater than 0"
        );

        let err = CacheError::UnknownDataType("options".to_string());
        assert_eq!(err.to_string(), "Unknown data type: options");
    }

    #[test]
    fn test_backend_conversion() {
        let backend = BackendError::Unavailable("redis down".to_string());
        let err: CacheError = backend.into();
        assert!(matches!(err, CacheError::BackendUnavailable(_)));
        assert!(err.to_string().contains("redis down"));
    }
}
