//! Storage tiers
//!
//! The cache is an ordered chain of [`CacheTier`]s, fastest first:
//!
//! - [`MemoryTier`]: in-process LRU, lost on exit
//! - [`SqliteTier`]: durable and shared between processes
//! - [`FileTier`]: cold JSON files partitioned by data type
//!
//! The manager only ever talks to the trait.

mod file;
mod memory;
mod sqlite;

pub use file::FileTier;
pub use memory::MemoryTier;
pub use sqlite::SqliteTier;

use crate::index::CacheEntry;
use crate::key::CacheKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use stockflow_utils::BackendError;

/// Which kind of storage a tier is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Memory,
    Sqlite,
    File,
}

impl TierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Sqlite => "sqlite",
            TierKind::File => "file",
        }
    }

    /// Whether data in this tier survives a process restart
    pub fn is_durable(self) -> bool {
        !matches!(self, TierKind::Memory)
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A descriptor together with its payload
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub entry: CacheEntry,
    pub payload: serde_json::Value,
}

/// Footprint of one tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStat {
    pub entries: usize,
    pub size_bytes: u64,
}

/// One storage backend in the cache chain
///
/// Implementations hold at most one entry per key and replace it whole on
/// `put`. They do not interpret TTLs; expiry is decided by the manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Kind of storage behind this tier
    fn kind(&self) -> TierKind;

    /// Fetch the entry stored under `key`
    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, BackendError>;

    /// Store `payload` under `entry.key`, replacing any previous entry
    async fn put(&self, entry: &CacheEntry, payload: &serde_json::Value) -> Result<(), BackendError>;

    /// Remove the entry stored under `key`, reporting whether it existed
    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError>;

    /// Descriptors of every stored entry
    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError>;

    /// Entry count and storage footprint
    async fn stat(&self) -> Result<TierStat, BackendError>;
}
