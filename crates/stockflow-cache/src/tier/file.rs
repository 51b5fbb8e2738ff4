//! Cold file tier
//!
//! Layout under the root directory:
//!
//! ```text
//! market_data/<key>.json
//! news/<key>.json
//! fundamentals/<key>.json
//! metadata/<key>_meta.json
//! ```
//!
//! Writes land payload first, then descriptor; deletes remove the descriptor
//! first. A reader therefore either finds a descriptor whose payload exists or
//! no descriptor at all. Both files are replaced by atomic rename.

use super::{CacheTier, StoredEntry, TierKind, TierStat};
use crate::index::{CacheEntry, FileIndex};
use crate::key::{CacheKey, DataType};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stockflow_utils::BackendError;
use stockflow_utils::storage;
use tracing::debug;

/// JSON-file tier, durable and readable by any process sharing the directory
#[derive(Debug, Clone)]
pub struct FileTier {
    root: PathBuf,
    index: FileIndex,
}

impl FileTier {
    /// Open the tier rooted at `root`, creating the namespace directories
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        for data_type in DataType::ALL {
            std::fs::create_dir_all(root.join(data_type.as_str()))?;
        }
        let index = FileIndex::new(root.join("metadata"));
        std::fs::create_dir_all(index.dir())?;

        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload_path(&self, data_type: DataType, key: &CacheKey) -> Result<PathBuf, BackendError> {
        if !storage::is_safe_file_stem(key.as_str()) {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(data_type.as_str()).join(format!("{key}.json")))
    }
}

#[async_trait]
impl CacheTier for FileTier {
    fn kind(&self) -> TierKind {
        TierKind::File
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, BackendError> {
        let Some(entry) = self.index.lookup(key).await? else {
            return Ok(None);
        };

        let path = self.payload_path(entry.data_type, key)?;
        match storage::read_json(&path).await? {
            Some(payload) => Ok(Some(StoredEntry { entry, payload })),
            None => {
                debug!(key = %key, "Dropping cache metadata without payload");
                self.index.remove(key).await?;
                Ok(None)
            }
        }
    }

    async fn put(&self, entry: &CacheEntry, payload: &serde_json::Value) -> Result<(), BackendError> {
        let path = self.payload_path(entry.data_type, &entry.key)?;
        storage::write_json_atomic(&path, payload).await?;
        self.index
            .record(&entry.with_payload_ref(path.display().to_string()))
            .await
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError> {
        let Some(entry) = self.index.lookup(key).await? else {
            return Ok(false);
        };
        let existed = self.index.remove(key).await?;
        storage::remove_if_exists(&self.payload_path(entry.data_type, key)?).await?;
        Ok(existed)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError> {
        self.index.entries().await
    }

    async fn stat(&self) -> Result<TierStat, BackendError> {
        let entries = self.index.entries().await?;
        let mut size_bytes = 0;
        for entry in &entries {
            size_bytes += storage::file_size(&self.payload_path(entry.data_type, &entry.key)?).await?;
        }
        Ok(TierStat {
            entries: entries.len(),
            size_bytes,
        })
    }
}
