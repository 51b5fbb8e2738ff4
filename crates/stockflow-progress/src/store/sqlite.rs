use super::ProgressStore;
use crate::record::ProgressRecord;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use stockflow_utils::BackendError;
use stockflow_utils::storage::open_sqlite;
use tokio::sync::Mutex;
use tracing::warn;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS analysis_progress (
        analysis_id TEXT PRIMARY KEY,
        status      TEXT NOT NULL,
        last_update INTEGER NOT NULL,
        record      TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_analysis_progress_last_update
        ON analysis_progress(last_update);
";

/// Progress records in a SQLite table, one row per analysis
pub struct SqliteProgressStore {
    conn: Mutex<Connection>,
}

impl SqliteProgressStore {
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = open_sqlite(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self, analysis_id: &str) -> Result<Option<ProgressRecord>, BackendError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT record FROM analysis_progress WHERE analysis_id = ?1",
                params![analysis_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &ProgressRecord) -> Result<(), BackendError> {
        let raw = serde_json::to_string(record)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO analysis_progress (analysis_id, status, last_update, record)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(analysis_id) DO UPDATE SET
                status = excluded.status,
                last_update = excluded.last_update,
                record = excluded.record",
            params![
                record.analysis_id,
                record.status.as_str(),
                record.last_update.timestamp_millis(),
                raw
            ],
        )?;
        Ok(())
    }

    async fn remove(&self, analysis_id: &str) -> Result<bool, BackendError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM analysis_progress WHERE analysis_id = ?1",
            params![analysis_id],
        )?;
        Ok(removed > 0)
    }

    async fn records(&self) -> Result<Vec<ProgressRecord>, BackendError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT analysis_id, record FROM analysis_progress")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (analysis_id, raw) = row?;
            match serde_json::from_str(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(analysis_id = %analysis_id, error = %e, "Skipping unreadable progress row"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProgressStatus;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_and_load() {
        let store = SqliteProgressStore::open_in_memory().unwrap();
        let mut record = ProgressRecord::new("a1", 3, Utc::now());
        store.save(&record).await.unwrap();

        record.status = ProgressStatus::Running;
        record.current_step_index = 2;
        store.save(&record).await.unwrap();

        assert_eq!(store.load("a1").await.unwrap(), Some(record));
        assert_eq!(store.records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_database_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.db");
        let writer = SqliteProgressStore::open(&path).unwrap();
        let reader = SqliteProgressStore::open(&path).unwrap();

        let record = ProgressRecord::new("a1", 3, Utc::now());
        writer.save(&record).await.unwrap();
        assert_eq!(reader.load("a1").await.unwrap(), Some(record));

        assert!(reader.remove("a1").await.unwrap());
        assert!(writer.load("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = SqliteProgressStore::open_in_memory().unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(!store.remove("nope").await.unwrap());
    }
}
