//! Storage primitives shared by the cache tiers and the progress stores
//!
//! Everything here is safe to use from several processes at once: JSON files
//! are replaced by atomic rename, so a reader sees either the previous file or
//! the new one, and SQLite connections run in WAL mode with a busy timeout.

use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long a SQLite writer waits on a lock held by another process
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A storage backend could not serve a request
#[derive(Debug, Error)]
pub enum BackendError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored document could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend is not reachable at all
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Key cannot be mapped onto this backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Whether `name` can be used verbatim as a file stem
pub fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &bytes).await
}

/// Atomically replace `path` with `bytes`
///
/// The bytes land in a uniquely named sibling first and are renamed over the
/// target, so concurrent readers never observe a partially written file.
pub async fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| BackendError::InvalidKey(path.display().to_string()))?;
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BackendError::InvalidKey(path.display().to_string()))?;
    let tmp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Read and deserialize a JSON file, `None` if it does not exist
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a file, reporting whether it existed
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Size of a file in bytes, zero if it is gone
pub async fn file_size(path: &Path) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Open a SQLite database shared between processes
pub fn open_sqlite(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(SQLITE_BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened SQLite database");
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}
