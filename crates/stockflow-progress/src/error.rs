//! Error types for progress tracking

use crate::record::ProgressStatus;
use stockflow_utils::BackendError;
use thiserror::Error;

/// Progress tracking errors
///
/// `NotFound`, `DuplicateId` and `InvalidTransition` point at a caller bug and
/// are returned to the pipeline. Store failures during tracking are logged
/// and absorbed; `BackendUnavailable` only comes out of store construction.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// No record exists for the analysis id
    #[error("Analysis not found: {0}")]
    NotFound(String),

    /// A live record already exists for the analysis id
    #[error("Analysis already in progress: {0}")]
    DuplicateId(String),

    /// The requested status change is not allowed
    #[error("Invalid transition for {analysis_id}: {from} -> {to}")]
    InvalidTransition {
        analysis_id: String,
        from: ProgressStatus,
        to: ProgressStatus,
    },

    /// The id cannot be used as a storage key
    #[error("Invalid analysis id: {0:?}")]
    InvalidAnalysisId(String),

    /// A record needs at least one step
    #[error("Invalid step count: {0}")]
    InvalidStepCount(usize),

    /// An analysis plan could not be built
    #[error("Invalid analysis plan: {0}")]
    InvalidPlan(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The progress store could not be opened
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),
}

/// Result type alias for progress operations
pub type Result<T> = std::result::Result<T, ProgressError>;
