//! Tiered cache for external market data
//!
//! Analysis pipelines call the [`CacheManager`] before every external fetch so
//! that prices, news and fundamentals already pulled within their validity
//! window are served locally. The cache is a chain of storage tiers:
//!
//! - a bounded in-process LRU ([`MemoryTier`])
//! - a SQLite database shared between processes ([`SqliteTier`])
//! - a directory of JSON files partitioned by data type ([`FileTier`])
//!
//! Every entry carries a [`CacheEntry`] descriptor; its [`DataType`] fixes the
//! time-to-live (6 hours for market data, 24 hours for news and fundamentals).
//!
//! # Example
//!
//! ```rust,ignore
//! use stockflow_cache::{CacheConfig, CacheManager, CacheRequest, DataType};
//!
//! let cache = CacheManager::from_config(&CacheConfig::from_env()?)?;
//! let request = CacheRequest::new(DataType::MarketData, "AAPL", "yfinance")
//!     .between("2024-01-01", "2024-06-30");
//!
//! let bars = cache
//!     .get_or_fetch(&request, || async { fetch_bars("AAPL").await })
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod key;
pub mod manager;
pub mod tier;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use index::CacheEntry;
pub use key::{CacheKey, CacheRequest, DataType, DateRange};
pub use manager::{CacheManager, CacheStats, TierStats};
pub use tier::{CacheTier, FileTier, MemoryTier, SqliteTier, StoredEntry, TierKind, TierStat};
