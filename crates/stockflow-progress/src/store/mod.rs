//! Shared stores holding progress records
//!
//! A store is the only channel between the process running an analysis and
//! the processes observing it. Every `save` replaces the whole record
//! atomically, so readers see either the previous or the new snapshot.

mod file;
mod memory;
mod sqlite;

pub use file::FileProgressStore;
pub use memory::MemoryProgressStore;
pub use sqlite::SqliteProgressStore;

use crate::record::ProgressRecord;
use async_trait::async_trait;
use stockflow_utils::BackendError;

/// Keyed storage of progress records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    async fn load(&self, analysis_id: &str) -> Result<Option<ProgressRecord>, BackendError>;

    /// Replace the record for `record.analysis_id`
    async fn save(&self, record: &ProgressRecord) -> Result<(), BackendError>;

    /// Returns whether a record was removed
    async fn remove(&self, analysis_id: &str) -> Result<bool, BackendError>;

    /// Every readable record, in no particular order
    async fn records(&self) -> Result<Vec<ProgressRecord>, BackendError>;
}
