use super::ProgressStore;
use crate::record::ProgressRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stockflow_utils::BackendError;
use stockflow_utils::storage::{is_safe_file_stem, read_json, remove_if_exists, write_json_atomic};
use tracing::warn;

const PREFIX: &str = "progress_";
const SUFFIX: &str = ".json";

/// One `progress_<id>.json` file per analysis in a shared directory
///
/// Writes go through a temporary sibling and a rename, so a concurrent
/// reader never parses a half-written record.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Use (and create) `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, analysis_id: &str) -> Result<PathBuf, BackendError> {
        if !is_safe_file_stem(analysis_id) {
            return Err(BackendError::InvalidKey(analysis_id.to_string()));
        }
        Ok(self.dir.join(format!("{PREFIX}{analysis_id}{SUFFIX}")))
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, analysis_id: &str) -> Result<Option<ProgressRecord>, BackendError> {
        read_json(&self.path_for(analysis_id)?).await
    }

    async fn save(&self, record: &ProgressRecord) -> Result<(), BackendError> {
        write_json_atomic(&self.path_for(&record.analysis_id)?, record).await
    }

    async fn remove(&self, analysis_id: &str) -> Result<bool, BackendError> {
        remove_if_exists(&self.path_for(analysis_id)?).await
    }

    async fn records(&self) -> Result<Vec<ProgressRecord>, BackendError> {
        let mut records = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX));
            if !is_record {
                continue;
            }

            match read_json::<ProgressRecord>(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable progress file"),
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
    async fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileProgressStore::open(dir.path()).unwrap();
        let record = ProgressRecord::new("a1", 3, Utc::now());

        store.save(&record).await.unwrap();
        assert!(dir.path().join("progress_a1.json").exists());
        assert_eq!(store.load("a1").await.unwrap(), Some(record));
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_store_sees_updates() {
        let dir = TempDir::new().unwrap();
        let writer = FileProgressStore::open(dir.path()).unwrap();
        let reader = FileProgressStore::open(dir.path()).unwrap();

        let mut record = ProgressRecord::new("a1", 3, Utc::now());
        writer.save(&record).await.unwrap();
        record.status = ProgressStatus::Running;
        record.current_step_index = 1;
        writer.save(&record).await.unwrap();

        let seen = reader.load("a1").await.unwrap().unwrap();
        assert_eq!(seen.status, ProgressStatus::Running);
        assert_eq!(seen.current_step_index, 1);
    }

    #[tokio::test]
    async fn test_records_skip_foreign_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let store = FileProgressStore::open(dir.path()).unwrap();
        store.save(&ProgressRecord::new("a1", 3, Utc::now())).await.unwrap();
        store.save(&ProgressRecord::new("a2", 3, Utc::now())).await.unwrap();
        std::fs::write(dir.path().join("progress_bad.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let mut ids: Vec<String> = store
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.analysis_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileProgressStore::open(dir.path()).unwrap();
        let result = store.load("../escape").await;
        assert!(matches!(result, Err(BackendError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileProgressStore::open(dir.path()).unwrap();
        store.save(&ProgressRecord::new("a1", 3, Utc::now())).await.unwrap();

        assert!(store.remove("a1").await.unwrap());
        assert!(!store.remove("a1").await.unwrap());
    }
}
