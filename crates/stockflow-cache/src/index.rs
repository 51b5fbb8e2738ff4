//! Metadata index: one descriptor per cached payload
//!
//! A [`CacheEntry`] says what a payload is, when it was cached and where the
//! tier keeps it. Tiers consult it for lookups and every TTL decision; the
//! payload itself never lives in the index.

use crate::key::{CacheKey, CacheRequest, DataType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use stockflow_utils::storage::{self, BackendError};

/// Descriptor of one cached payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub data_type: DataType,
    pub symbol: String,
    #[serde(rename = "data_source")]
    pub source: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub cached_at: DateTime<Utc>,
    /// Tier-specific location of the payload
    #[serde(default)]
    pub payload_ref: String,
    /// Size of the serialized payload
    #[serde(default)]
    pub size_bytes: u64,
}

impl CacheEntry {
    /// Describe a payload fetched for `request`
    pub fn for_request(request: &CacheRequest, cached_at: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            key: request.key(),
            data_type: request.data_type,
            symbol: request.symbol.clone(),
            source: request.source.clone(),
            start_date: request.range.start_date.clone(),
            end_date: request.range.end_date.clone(),
            params: request.params.clone(),
            cached_at,
            payload_ref: String::new(),
            size_bytes,
        }
    }

    /// Same descriptor pointing at another payload location
    pub fn with_payload_ref(&self, payload_ref: impl Into<String>) -> Self {
        Self {
            payload_ref: payload_ref.into(),
            ..self.clone()
        }
    }

    pub fn ttl(&self) -> Duration {
        self.data_type.ttl()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.cached_at + self.ttl()
    }

    /// An entry is live strictly before `cached_at + ttl`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }
}

/// Entry counts and logical size of a set of descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub total_entries: usize,
    pub per_data_type: BTreeMap<DataType, usize>,
    pub total_size_bytes: u64,
}

impl IndexSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CacheEntry>) -> Self {
        let mut summary = Self {
            per_data_type: DataType::ALL.iter().map(|t| (*t, 0)).collect(),
            ..Self::default()
        };
        for entry in entries {
            summary.total_entries += 1;
            *summary.per_data_type.entry(entry.data_type).or_insert(0) += 1;
            summary.total_size_bytes += entry.size_bytes;
        }
        summary
    }
}

/// Metadata namespace on disk: one `<key>_meta.json` file per entry
#[derive(Debug, Clone)]
pub struct FileIndex {
    dir: PathBuf,
}

impl FileIndex {
    const SUFFIX: &'static str = "_meta.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &CacheKey) -> Result<PathBuf, BackendError> {
        if !storage::is_safe_file_stem(key.as_str()) {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}{}", Self::SUFFIX)))
    }

    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, BackendError> {
        storage::read_json(&self.path(key)?).await
    }

    pub async fn record(&self, entry: &CacheEntry) -> Result<(), BackendError> {
        storage::write_json_atomic(&self.path(&entry.key)?, entry).await
    }

    pub async fn remove(&self, key: &CacheKey) -> Result<bool, BackendError> {
        storage::remove_if_exists(&self.path(key)?).await
    }

    /// Every readable descriptor; unreadable files are skipped with a warning
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(Self::SUFFIX) && !n.starts_with('.'));
            if !is_meta {
                continue;
            }
            match storage::read_json::<CacheEntry>(&path).await {
                Ok(Some(entry)) => entries.push(entry),
                // removed between listing and reading
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping unreadable cache metadata: {}", e);
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data_type: DataType, symbol: &str, cached_at: DateTime<Utc>) -> CacheEntry {
        let request = CacheRequest::new(data_type, symbol, "test");
        CacheEntry::for_request(&request, cached_at, 10)
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let e = entry(DataType::MarketData, "AAPL", now);
        assert!(!e.is_expired(now + Duration::hours(6) - Duration::seconds(1)));
        assert!(e.is_expired(now + Duration::hours(6)));

        let news = entry(DataType::News, "AAPL", now);
        assert!(!news.is_expired(now + Duration::hours(23)));
        assert!(news.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let entries = [
            entry(DataType::MarketData, "AAPL", now),
            entry(DataType::MarketData, "MSFT", now),
            entry(DataType::News, "AAPL", now),
        ];
        let summary = IndexSummary::from_entries(&entries);
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.per_data_type[&DataType::MarketData], 2);
        assert_eq!(summary.per_data_type[&DataType::News], 1);
        assert_eq!(summary.per_data_type[&DataType::Fundamentals], 0);
        assert_eq!(summary.total_size_bytes, 30);
    }

    #[test]
    fn test_metadata_json_shape() {
        let e = entry(DataType::Fundamentals, "600519", Utc::now());
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["data_type"], "fundamentals");
        assert_eq!(json["data_source"], "test");
        assert_eq!(json["symbol"], "600519");
    }

    #[tokio::test]
    async fn test_file_index_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileIndex::new(dir.path().join("metadata"));
        let e = entry(DataType::News, "AAPL", Utc::now());

        assert!(index.lookup(&e.key).await.unwrap().is_none());
        assert!(index.entries().await.unwrap().is_empty());

        index.record(&e).await.unwrap();
        assert_eq!(index.lookup(&e.key).await.unwrap(), Some(e.clone()));
        assert_eq!(index.entries().await.unwrap().len(), 1);

        assert!(index.remove(&e.key).await.unwrap());
        assert!(!index.remove(&e.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_index_rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileIndex::new(dir.path());
        let key = CacheKey::from_raw("../escape");
        assert!(matches!(
            index.lookup(&key).await,
            Err(BackendError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_file_index_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileIndex::new(dir.path());
        index.record(&entry(DataType::News, "AAPL", Utc::now())).await.unwrap();
        std::fs::write(dir.path().join("broken_meta.json"), b"{not json").unwrap();

        assert_eq!(index.entries().await.unwrap().len(), 1);
    }
}
