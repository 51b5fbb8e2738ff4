//! Cache manager: the public face of the tiered cache
//!
//! Lookups walk the tiers fastest first and promote hits into the faster
//! tiers. Writes go to every tier. Tier failures are logged and absorbed: the
//! worst a broken backend can do is turn a hit into a miss.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::index::{CacheEntry, IndexSummary};
use crate::key::{CacheKey, CacheRequest, DataType};
use crate::tier::{CacheTier, FileTier, MemoryTier, SqliteTier, StoredEntry, TierKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use stockflow_utils::clock::{Clock, system_clock};
use tracing::{debug, error, info, warn};

/// Contribution of one tier to [`CacheStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub kind: TierKind,
    pub available: bool,
    pub entries: usize,
    pub size_bytes: u64,
}

/// Aggregate view over every tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Distinct keys held by at least one tier
    pub total_entries: usize,
    pub per_data_type: BTreeMap<DataType, usize>,
    /// Logical payload size of the distinct entries
    pub total_size_bytes: u64,
    pub tiers: Vec<TierStats>,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn count(&self, data_type: DataType) -> usize {
        self.per_data_type.get(&data_type).copied().unwrap_or(0)
    }
}

/// Tiered cache facade
pub struct CacheManager {
    tiers: Vec<Arc<dyn CacheTier>>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    /// Create a manager over `tiers`, ordered fastest first
    pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self::with_clock(tiers, system_clock())
    }

    /// Create a manager with an explicit time source
    pub fn with_clock(tiers: Vec<Arc<dyn CacheTier>>, clock: Arc<dyn Clock>) -> Self {
        Self { tiers, clock }
    }

    /// Build the tier chain described by `config`
    ///
    /// A tier that cannot be opened is logged and left out; the cache keeps
    /// working with whatever remains.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::from_config_with_clock(config, system_clock())
    }

    pub fn from_config_with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let mut tiers: Vec<Arc<dyn CacheTier>> = Vec::new();
        if config.memory_enabled {
            tiers.push(Arc::new(MemoryTier::new(config.memory_capacity)));
        }
        if let Some(path) = &config.database_path {
            match SqliteTier::open(path) {
                Ok(tier) => tiers.push(Arc::new(tier)),
                Err(e) => warn!(path = %path.display(), "SQLite cache tier unavailable: {}", e),
            }
        }
        if let Some(dir) = &config.cache_dir {
            match FileTier::open(dir.clone()) {
                Ok(tier) => tiers.push(Arc::new(tier)),
                Err(e) => warn!(dir = %dir.display(), "File cache tier unavailable: {}", e),
            }
        }

        info!(
            tiers = ?tiers.iter().map(|t| t.kind()).collect::<Vec<_>>(),
            "Cache manager initialized"
        );
        Ok(Self::with_clock(tiers, clock))
    }

    /// Kinds of the configured tiers, fastest first
    pub fn tier_kinds(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|t| t.kind()).collect()
    }

    /// Cached payload for `request`, or `None` on a miss
    pub async fn get(&self, request: &CacheRequest) -> Option<serde_json::Value> {
        self.lookup(&request.key()).await.map(|stored| stored.payload)
    }

    /// Cached payload together with its descriptor
    pub async fn get_entry(&self, request: &CacheRequest) -> Option<StoredEntry> {
        self.lookup(&request.key()).await
    }

    async fn lookup(&self, key: &CacheKey) -> Option<StoredEntry> {
        let now = self.clock.now();

        for (position, tier) in self.tiers.iter().enumerate() {
            let stored = match tier.get(key).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tier = %tier.kind(), key = %key, "Cache tier read failed: {}", e);
                    continue;
                }
            };

            if stored.entry.is_expired(now) {
                debug!(tier = %tier.kind(), key = %key, cached_at = %stored.entry.cached_at, "Evicting expired cache entry");
                if let Err(e) = tier.delete(key).await {
                    warn!(tier = %tier.kind(), key = %key, "Failed to evict expired entry: {}", e);
                }
                continue;
            }

            debug!(tier = %tier.kind(), key = %key, symbol = %stored.entry.symbol, "Cache hit");
            self.promote(&self.tiers[..position], tier, &stored).await;
            return Some(stored);
        }

        debug!(key = %key, "Cache miss");
        None
    }

    /// Copy a hit into the faster tiers. `cached_at` is kept so promotion never
    /// extends the entry's lifetime.
    ///
    /// The source tier is read again once the copies are written. If the entry
    /// was removed or replaced there in the meantime, the copies are withdrawn
    /// so they cannot outlive it.
    async fn promote(
        &self,
        faster: &[Arc<dyn CacheTier>],
        source: &Arc<dyn CacheTier>,
        stored: &StoredEntry,
    ) {
        let key = &stored.entry.key;
        let mut promoted = Vec::new();
        for tier in faster {
            match tier.put(&stored.entry, &stored.payload).await {
                Ok(()) => {
                    debug!(tier = %tier.kind(), key = %key, "Promoted cache entry");
                    promoted.push(tier);
                }
                Err(e) => warn!(tier = %tier.kind(), key = %key, "Cache promotion failed: {}", e),
            }
        }
        if promoted.is_empty() {
            return;
        }

        let still_current = match source.get(key).await {
            Ok(Some(current)) => current.entry.cached_at == stored.entry.cached_at,
            Ok(None) => false,
            Err(e) => {
                debug!(tier = %source.kind(), key = %key, "Could not recheck promoted entry: {}", e);
                true
            }
        };
        if still_current {
            return;
        }

        debug!(tier = %source.kind(), key = %key, "Entry changed at its source during promotion; withdrawing copies");
        for tier in promoted {
            if let Err(e) = tier.delete(key).await {
                warn!(tier = %tier.kind(), key = %key, "Failed to withdraw promoted entry: {}", e);
            }
        }
    }

    /// Store `payload` for `request` in every reachable tier
    ///
    /// Never fails: tier errors are logged, and if nothing could be written the
    /// caller simply sees a miss next time.
    pub async fn put(&self, request: &CacheRequest, payload: serde_json::Value) -> CacheKey {
        let size_bytes = serde_json::to_vec(&payload).map_or(0, |b| b.len() as u64);
        let entry = CacheEntry::for_request(request, self.clock.now(), size_bytes);

        let mut written = Vec::new();
        for tier in &self.tiers {
            match tier.put(&entry, &payload).await {
                Ok(()) => written.push(tier.kind()),
                Err(e) if tier.kind().is_durable() => {
                    warn!(tier = %tier.kind(), key = %entry.key, "Durable cache write failed: {}", e);
                }
                Err(e) => debug!(tier = %tier.kind(), key = %entry.key, "Cache write skipped: {}", e),
            }
        }

        if written.is_empty() {
            error!(key = %entry.key, symbol = %request.symbol, "Cache write failed on every tier");
        } else {
            info!(
                key = %entry.key,
                symbol = %request.symbol,
                data_type = %request.data_type,
                source = %request.source,
                tiers = ?written,
                "Cached data"
            );
        }
        entry.key
    }

    /// Get or fetch a payload using the provided fetcher function
    ///
    /// If the payload is cached it's returned immediately. Otherwise the
    /// fetcher is called and its result is written back to every tier.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        request: &CacheRequest,
        fetcher: F,
    ) -> std::result::Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<serde_json::Value, E>>,
    {
        if let Some(payload) = self.get(request).await {
            return Ok(payload);
        }

        let payload = fetcher().await?;
        self.put(request, payload.clone()).await;
        Ok(payload)
    }

    /// Remove `request` from every tier, reporting whether any tier held it
    pub async fn invalidate(&self, request: &CacheRequest) -> bool {
        let key = request.key();
        let mut removed = false;
        for tier in &self.tiers {
            match tier.delete(&key).await {
                Ok(existed) => removed |= existed,
                Err(e) => warn!(tier = %tier.kind(), key = %key, "Cache invalidation failed: {}", e),
            }
        }
        removed
    }

    /// Newest live entry for `symbol` regardless of date range or parameters
    ///
    /// Used when an exact lookup misses but any recent snapshot will do.
    pub async fn find_latest(
        &self,
        data_type: DataType,
        symbol: &str,
        source: Option<&str>,
    ) -> Option<StoredEntry> {
        let now = self.clock.now();
        let mut newest: Option<CacheEntry> = None;

        for tier in &self.tiers {
            let entries = match tier.entries().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(tier = %tier.kind(), "Cache tier listing failed: {}", e);
                    continue;
                }
            };
            for entry in entries {
                let matches = entry.data_type == data_type
                    && entry.symbol == symbol
                    && source.is_none_or(|s| entry.source == s)
                    && !entry.is_expired(now);
                if matches && newest.as_ref().is_none_or(|n| entry.cached_at > n.cached_at) {
                    newest = Some(entry);
                }
            }
        }

        match newest {
            Some(entry) => self.lookup(&entry.key).await,
            None => {
                debug!(symbol, data_type = %data_type, "No cached snapshot found");
                None
            }
        }
    }

    /// Aggregate statistics; an unreachable tier is reported, never raised
    pub async fn stats(&self) -> CacheStats {
        let mut distinct: HashMap<CacheKey, CacheEntry> = HashMap::new();
        let mut tiers = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            let listing = match tier.entries().await {
                Ok(entries) => tier.stat().await.map(|stat| (entries, stat)),
                Err(e) => Err(e),
            };

            match listing {
                Ok((entries, stat)) => {
                    tiers.push(TierStats {
                        kind: tier.kind(),
                        available: true,
                        entries: stat.entries,
                        size_bytes: stat.size_bytes,
                    });
                    for entry in entries {
                        distinct
                            .entry(entry.key.clone())
                            .and_modify(|known| {
                                if entry.cached_at > known.cached_at {
                                    *known = entry.clone();
                                }
                            })
                            .or_insert(entry);
                    }
                }
                Err(e) => {
                    warn!(tier = %tier.kind(), "Cache tier unavailable for stats: {}", e);
                    tiers.push(TierStats {
                        kind: tier.kind(),
                        available: false,
                        entries: 0,
                        size_bytes: 0,
                    });
                }
            }
        }

        let summary = IndexSummary::from_entries(distinct.values());
        CacheStats {
            total_entries: summary.total_entries,
            per_data_type: summary.per_data_type,
            total_size_bytes: summary.total_size_bytes,
            tiers,
        }
    }

    /// Remove every entry cached before `now - max_age`; returns the number of
    /// distinct keys removed
    ///
    /// Tiers are swept slowest first. A lookup that read an entry before the
    /// sweep removed it may still copy it into a faster tier; either the sweep
    /// reaches that tier afterwards, or the promotion sees the source copy
    /// gone and withdraws its own.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = self.cutoff(max_age);
        let mut removed: HashSet<CacheKey> = HashSet::new();

        for tier in self.tiers.iter().rev() {
            let entries = match tier.entries().await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(tier = %tier.kind(), "Skipping cache cleanup for unavailable tier: {}", e);
                    continue;
                }
            };

            let mut tier_removed = 0usize;
            for entry in entries.into_iter().filter(|e| e.cached_at < cutoff) {
                match tier.delete(&entry.key).await {
                    Ok(true) => {
                        tier_removed += 1;
                        removed.insert(entry.key);
                    }
                    Ok(false) => {}
                    Err(e) => warn!(tier = %tier.kind(), key = %entry.key, "Cache cleanup delete failed: {}", e),
                }
            }
            debug!(tier = %tier.kind(), removed = tier_removed, "Cleaned cache tier");
        }

        info!(removed = removed.len(), cutoff = %cutoff, "Cache cleanup finished");
        removed.len()
    }

    fn cutoff(&self, max_age: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
