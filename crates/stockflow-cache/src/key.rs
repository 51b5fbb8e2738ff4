//! Cache requests and composite keys

use crate::error::CacheError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of data held by a cache entry
///
/// Each kind has its own namespace in every tier and a fixed time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Price and volume history
    MarketData,
    /// News articles and headlines
    News,
    /// Financial statements and ratios
    Fundamentals,
}

impl DataType {
    /// Every data type, in namespace order
    pub const ALL: [DataType; 3] = [DataType::MarketData, DataType::News, DataType::Fundamentals];

    /// Time-to-live for entries of this type
    pub fn ttl(self) -> Duration {
        match self {
            DataType::MarketData => Duration::hours(6),
            DataType::News | DataType::Fundamentals => Duration::hours(24),
        }
    }

    /// Namespace name used in keys, directories and columns
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::MarketData => "market_data",
            DataType::News => "news",
            DataType::Fundamentals => "fundamentals",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market_data" | "stock_data" | "market" => Ok(DataType::MarketData),
            "news" | "news_data" => Ok(DataType::News),
            "fundamentals" | "fundamentals_data" => Ok(DataType::Fundamentals),
            other => Err(CacheError::UnknownDataType(other.to_string())),
        }
    }
}

/// Date range a request covers
///
/// Dates are kept as the caller formatted them; two requests only share an
/// entry when their strings match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRange {
    /// Range with both ends set
    pub fn new(start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            start_date: Some(start_date.into()),
            end_date: Some(end_date.into()),
        }
    }

    /// Single-day range, used for point-in-time data such as fundamentals
    pub fn on(date: impl Into<String>) -> Self {
        let date = date.into();
        Self {
            start_date: Some(date.clone()),
            end_date: Some(date),
        }
    }

    /// No range at all
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Everything that distinguishes one external data request from another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRequest {
    pub data_type: DataType,
    pub symbol: String,
    /// Upstream data source (e.g. "yfinance", "tushare")
    pub source: String,
    pub range: DateRange,
    /// Extra query parameters; ordered so insertion order never matters
    pub params: BTreeMap<String, String>,
}

impl CacheRequest {
    /// Create a request without a date range or extra parameters
    pub fn new(data_type: DataType, symbol: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            data_type,
            symbol: symbol.into(),
            source: source.into(),
            range: DateRange::default(),
            params: BTreeMap::new(),
        }
    }

    /// Set the date range
    pub fn range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    /// Set both ends of the date range
    pub fn between(self, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        self.range(DateRange::new(start_date, end_date))
    }

    /// Add an extra query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Composite key for this request
    pub fn key(&self) -> CacheKey {
        CacheKey::for_request(self)
    }
}

/// Canonical form hashed into a key. Field order is fixed and `params` is a
/// sorted map, so the serialization is deterministic.
#[derive(Serialize)]
struct KeyMaterial<'a> {
    data_type: DataType,
    symbol: &'a str,
    source: &'a str,
    start_date: Option<&'a str>,
    end_date: Option<&'a str>,
    params: &'a BTreeMap<String, String>,
}

/// Composite cache key: `<data_type>-<sha256 of the canonical request>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    fn for_request(request: &CacheRequest) -> Self {
        let material = KeyMaterial {
            data_type: request.data_type,
            symbol: &request.symbol,
            source: &request.source,
            start_date: request.range.start_date.as_deref(),
            end_date: request.range.end_date.as_deref(),
            params: &request.params,
        };
        // Serializing plain strings and a BTreeMap cannot fail
        let canonical = serde_json::to_vec(&material).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        Self(format!("{}-{}", request.data_type.as_str(), hex::encode(digest)))
    }

    /// Wrap an already computed key string
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CacheRequest {
        CacheRequest::new(DataType::MarketData, "AAPL", "yfinance").between("2024-01-01", "2024-06-30")
    }

    #[test]
    fn test_ttl_policy() {
        assert_eq!(DataType::MarketData.ttl(), Duration::hours(6));
        assert_eq!(DataType::News.ttl(), Duration::hours(24));
        assert_eq!(DataType::Fundamentals.ttl(), Duration::hours(24));
    }

    #[test]
    fn test_data_type_parsing() {
        assert_eq!("market_data".parse::<DataType>().unwrap(), DataType::MarketData);
        assert_eq!("stock_data".parse::<DataType>().unwrap(), DataType::MarketData);
        assert_eq!("News".parse::<DataType>().unwrap(), DataType::News);
        assert!("options".parse::<DataType>().is_err());
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(request().key(), request().key());
        assert!(request().key().as_str().starts_with("market_data-"));
    }

    #[test]
    fn test_param_order_does_not_matter() {
        let a = request().param("interval", "1d").param("adjust", "qfq");
        let b = request().param("adjust", "qfq").param("interval", "1d");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_every_field_distinguishes_keys() {
        let base = request().key();
        assert_ne!(base, CacheRequest { data_type: DataType::News, ..request() }.key());
        assert_ne!(base, CacheRequest { symbol: "MSFT".into(), ..request() }.key());
        assert_ne!(base, CacheRequest { source: "tushare".into(), ..request() }.key());
        assert_ne!(base, request().between("2024-01-02", "2024-06-30").key());
        assert_ne!(base, request().param("interval", "1d").key());
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = CacheRequest::new(DataType::News, "AB", "C").key();
        let b = CacheRequest::new(DataType::News, "A", "BC").key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_range_differs_from_empty_strings() {
        let unbounded = CacheRequest::new(DataType::News, "AAPL", "x").key();
        let empty = CacheRequest::new(DataType::News, "AAPL", "x").between("", "").key();
        assert_ne!(unbounded, empty);
    }
}
