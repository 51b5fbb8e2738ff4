//! In-process LRU tier

use super::{CacheTier, StoredEntry, TierKind, TierStat};
use crate::index::CacheEntry;
use crate::key::CacheKey;
use async_trait::async_trait;
use cached::{Cached, SizedCache};
use stockflow_utils::BackendError;
use tokio::sync::Mutex;

/// Fast volatile tier bounded to a fixed number of entries
///
/// Descriptor and payload sit in the same slot behind one lock, so readers
/// never see one without the other.
pub struct MemoryTier {
    slots: Mutex<SizedCache<CacheKey, StoredEntry>>,
}

impl MemoryTier {
    /// Create a tier holding at most `capacity` entries (must be non-zero)
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(SizedCache::with_size(capacity)),
        }
    }

    /// Number of resident entries
    pub async fn len(&self) -> usize {
        self.slots.lock().await.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.slots.lock().await.cache_clear();
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn kind(&self) -> TierKind {
        TierKind::Memory
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, BackendError> {
        let mut slots = self.slots.lock().await;
        Ok(slots.cache_get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry, payload: &serde_json::Value) -> Result<(), BackendError> {
        let stored = StoredEntry {
            entry: entry.with_payload_ref(format!("memory://{}", entry.key)),
            payload: payload.clone(),
        };
        let mut slots = self.slots.lock().await;
        let _ = slots.cache_set(entry.key.clone(), stored);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError> {
        let mut slots = self.slots.lock().await;
        Ok(slots.cache_remove(key).is_some())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError> {
        let slots = self.slots.lock().await;
        Ok(slots.value_order().map(|s| s.entry.clone()).collect())
    }

    async fn stat(&self) -> Result<TierStat, BackendError> {
        let slots = self.slots.lock().await;
        Ok(TierStat {
            entries: slots.cache_size(),
            size_bytes: slots.value_order().map(|s| s.entry.size_bytes).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{CacheRequest, DataType};
    use chrono::Utc;
    use serde_json::json;

    fn entry(symbol: &str) -> CacheEntry {
        let request = CacheRequest::new(DataType::MarketData, symbol, "yfinance");
        CacheEntry::for_request(&request, Utc::now(), 16)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let tier = MemoryTier::new(8);
        let e = entry("AAPL");
        tier.put(&e, &json!({"price": 150.0})).await.unwrap();

        let stored = tier.get(&e.key).await.unwrap().unwrap();
        assert_eq!(stored.payload, json!({"price": 150.0}));
        assert!(stored.entry.payload_ref.starts_with("memory://"));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_one_entry() {
        let tier = MemoryTier::new(8);
        let e = entry("AAPL");
        tier.put(&e, &json!(1)).await.unwrap();
        tier.put(&e, &json!(2)).await.unwrap();

        assert_eq!(tier.len().await, 1);
        assert_eq!(tier.get(&e.key).await.unwrap().unwrap().payload, json!(2));
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let tier = MemoryTier::new(2);
        let (a, b, c) = (entry("A"), entry("B"), entry("C"));
        tier.put(&a, &json!("a")).await.unwrap();
        tier.put(&b, &json!("b")).await.unwrap();
        // touch A so B becomes the eviction candidate
        assert!(tier.get(&a.key).await.unwrap().is_some());
        tier.put(&c, &json!("c")).await.unwrap();

        assert!(tier.get(&a.key).await.unwrap().is_some());
        assert!(tier.get(&b.key).await.unwrap().is_none());
        assert!(tier.get(&c.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_stat_and_clear() {
        let tier = MemoryTier::new(8);
        let (a, b) = (entry("A"), entry("B"));
        tier.put(&a, &json!("a")).await.unwrap();
        tier.put(&b, &json!("b")).await.unwrap();

        let stat = tier.stat().await.unwrap();
        assert_eq!(stat, TierStat { entries: 2, size_bytes: 32 });
        assert_eq!(tier.entries().await.unwrap().len(), 2);

        assert!(tier.delete(&a.key).await.unwrap());
        assert!(!tier.delete(&a.key).await.unwrap());

        tier.clear().await;
        assert!(tier.is_empty().await);
    }
}
