use super::ProgressStore;
use crate::record::ProgressRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use stockflow_utils::BackendError;
use tokio::sync::RwLock;

/// In-process store for single-process runs and tests
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: RwLock<HashMap<String, ProgressRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, analysis_id: &str) -> Result<Option<ProgressRecord>, BackendError> {
        Ok(self.records.read().await.get(analysis_id).cloned())
    }

    async fn save(&self, record: &ProgressRecord) -> Result<(), BackendError> {
        self.records
            .write()
            .await
            .insert(record.analysis_id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, analysis_id: &str) -> Result<bool, BackendError> {
        Ok(self.records.write().await.remove(analysis_id).is_some())
    }

    async fn records(&self) -> Result<Vec<ProgressRecord>, BackendError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
