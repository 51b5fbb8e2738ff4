//! Durable SQLite tier

use super::{CacheTier, StoredEntry, TierKind, TierStat};
use crate::index::CacheEntry;
use crate::key::CacheKey;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use stockflow_utils::BackendError;
use stockflow_utils::storage::open_sqlite;
use tokio::sync::Mutex;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS cache_entries (
        cache_key  TEXT PRIMARY KEY,
        data_type  TEXT NOT NULL,
        symbol     TEXT NOT NULL,
        cached_at  INTEGER NOT NULL,
        size_bytes INTEGER NOT NULL,
        metadata   TEXT NOT NULL,
        payload    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cache_entries_type
        ON cache_entries(data_type, symbol);
    CREATE INDEX IF NOT EXISTS idx_cache_entries_cached_at
        ON cache_entries(cached_at);
";

/// Durable tier shared by every process pointing at the same database file
///
/// Descriptor and payload share a row, so a delete removes both atomically.
pub struct SqliteTier {
    conn: Mutex<Connection>,
}

impl SqliteTier {
    /// Open (or create) the cache table in the database at `path`
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = open_sqlite(path)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database, mostly useful in tests
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn payload_ref(key: &CacheKey) -> String {
        format!("sqlite://cache_entries/{key}")
    }
}

#[async_trait]
impl CacheTier for SqliteTier {
    fn kind(&self) -> TierKind {
        TierKind::Sqlite
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredEntry>, BackendError> {
        let conn = self.conn.lock().await;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT metadata, payload FROM cache_entries WHERE cache_key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((metadata, payload)) => Ok(Some(StoredEntry {
                entry: serde_json::from_str(&metadata)?,
                payload: serde_json::from_str(&payload)?,
            })),
            None => Ok(None),
        }
    }

    async fn put(&self, entry: &CacheEntry, payload: &serde_json::Value) -> Result<(), BackendError> {
        let entry = entry.with_payload_ref(Self::payload_ref(&entry.key));
        let metadata = serde_json::to_string(&entry)?;
        let payload = serde_json::to_string(payload)?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
                (cache_key, data_type, symbol, cached_at, size_bytes, metadata, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.key.as_str(),
                entry.data_type.as_str(),
                entry.symbol,
                entry.cached_at.timestamp_millis(),
                entry.size_bytes as i64,
                metadata,
                payload,
            ],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool, BackendError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE cache_key = ?1",
            params![key.as_str()],
        )?;
        Ok(removed > 0)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, BackendError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT metadata FROM cache_entries ORDER BY cached_at")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut entries = Vec::new();
        for metadata in rows {
            entries.push(serde_json::from_str(&metadata?)?);
        }
        Ok(entries)
    }

    async fn stat(&self) -> Result<TierStat, BackendError> {
        let conn = self.conn.lock().await;
        let (entries, size_bytes): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(payload)), 0) FROM cache_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(TierStat {
            entries: entries as usize,
            size_bytes: size_bytes as u64,
        })
    }
}
