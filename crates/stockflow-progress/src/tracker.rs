//! Writer and reader side of analysis progress

use crate::config::ProgressConfig;
use crate::error::{ProgressError, Result};
use crate::estimator::TimeEstimator;
use crate::plan::AnalysisPlan;
use crate::record::{
    MAX_RUNNING_PERCENTAGE, ProgressRecord, ProgressStatus, remaining, seconds_between,
};
use crate::store::ProgressStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use stockflow_utils::storage::is_safe_file_stem;
use stockflow_utils::{Clock, system_clock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Records analysis progress into a shared store and reads it back
///
/// The process running an analysis keeps the records it is still writing in
/// memory, so a failing store never breaks the analysis: writes are logged and
/// dropped, and reads fall back to the local copy while the store errors. A
/// local copy is released once its terminal state reaches the store, after
/// which the store alone decides whether the record exists. Observers in other
/// processes build their own tracker over the same store and only call the
/// read methods.
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    owned: Mutex<HashMap<String, ProgressRecord>>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self::with_clock(store, system_clock())
    }

    pub fn with_clock(store: Arc<dyn ProgressStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            owned: Mutex::new(HashMap::new()),
        }
    }

    /// Tracker over the store named by `config`
    pub fn from_config(config: &ProgressConfig) -> Result<Self> {
        Ok(Self::new(config.open_store()?))
    }

    /// Start a pending record with `total_steps` steps
    pub async fn create(&self, analysis_id: &str, total_steps: usize) -> Result<ProgressRecord> {
        self.create_record(analysis_id, total_steps, None).await
    }

    /// Start a pending record following `plan`
    ///
    /// Step names come from the plan and its step weights drive the time
    /// estimate. The plan's upfront duration is reported until the first step
    /// update replaces it.
    pub async fn create_with_plan(
        &self,
        analysis_id: &str,
        plan: AnalysisPlan,
    ) -> Result<ProgressRecord> {
        let total = plan.total_steps();
        self.create_record(analysis_id, total, Some(plan)).await
    }

    async fn create_record(
        &self,
        analysis_id: &str,
        total_steps: usize,
        plan: Option<AnalysisPlan>,
    ) -> Result<ProgressRecord> {
        if !is_safe_file_stem(analysis_id) {
            return Err(ProgressError::InvalidAnalysisId(analysis_id.to_string()));
        }
        if total_steps == 0 {
            return Err(ProgressError::InvalidStepCount(total_steps));
        }

        if let Some(existing) = self.current(analysis_id).await {
            if !existing.is_terminal() {
                return Err(ProgressError::DuplicateId(analysis_id.to_string()));
            }
            debug!(analysis_id, status = %existing.status, "Replacing finished progress record");
        }

        let mut record = ProgressRecord::new(analysis_id, total_steps, self.clock.now());
        if let Some(plan) = plan {
            record.estimated_total_time = plan.estimated_duration();
            record.remaining_time = plan.estimated_duration();
            record.steps = plan.into_steps();
            if let Some(first) = record.steps.first() {
                record.current_step_name = first.name.clone();
                record.current_step_description = first.description.clone();
            }
        }

        info!(analysis_id, total_steps, "Tracking analysis progress");
        self.commit(record.clone()).await;
        Ok(record)
    }

    /// Record that the analysis is at `step_index`
    ///
    /// An index past the end is clamped to `total_steps`. A step index lower
    /// than the current one only updates the message. The percentage stays
    /// below 100 until [`complete`](Self::complete).
    pub async fn advance(
        &self,
        analysis_id: &str,
        step_index: usize,
        step_name: &str,
        step_description: &str,
        message: &str,
    ) -> Result<ProgressRecord> {
        let mut record = self.load_for_write(analysis_id).await?;
        if record.is_terminal() {
            return Err(ProgressError::InvalidTransition {
                analysis_id: analysis_id.to_string(),
                from: record.status,
                to: ProgressStatus::Running,
            });
        }

        let now = self.clock.now();
        let total = record.total_steps;
        let index = step_index.min(total);

        if index < record.current_step_index {
            debug!(
                analysis_id,
                current = record.current_step_index,
                requested = index,
                "Ignoring step regression"
            );
        } else {
            record.current_step_index = index;
            record.current_step_name = step_name.to_string();
            record.current_step_description = step_description.to_string();
        }
        record.last_message = message.to_string();
        record.status = ProgressStatus::Running;

        let percentage = (record.current_step_index as f64 / total as f64 * 100.0)
            .min(MAX_RUNNING_PERCENTAGE);
        record.progress_percentage = percentage.max(record.progress_percentage);

        let elapsed = seconds_between(record.start_time, now);
        let estimate =
            TimeEstimator::for_record(&record).estimate(total, record.current_step_index, elapsed);
        record.elapsed_time = elapsed;
        record.estimated_total_time = estimate;
        record.remaining_time = remaining(estimate, elapsed);
        record.last_update = now;

        debug!(
            analysis_id,
            step = record.current_step_index,
            total,
            percentage = record.progress_percentage,
            "Progress updated"
        );
        self.commit(record.clone()).await;
        Ok(record)
    }

    /// [`advance`](Self::advance) using the planned name of `step_index`
    pub async fn advance_to(
        &self,
        analysis_id: &str,
        step_index: usize,
        message: &str,
    ) -> Result<ProgressRecord> {
        let record = self.load_for_write(analysis_id).await?;
        let (name, description) = match record.steps.get(step_index) {
            Some(step) => (step.name.clone(), step.description.clone()),
            None => (format!("Step {}", step_index + 1), String::new()),
        };
        self.advance(analysis_id, step_index, &name, &description, message)
            .await
    }

    /// Advance to whichever step a free-form progress message points at
    ///
    /// A message naming a planned step ("Market analysis started") moves to
    /// it, "module completed" moves one step on, and tool call chatter or an
    /// unrecognised message only updates the message. Detection never moves
    /// the record backwards.
    pub async fn advance_from_message(
        &self,
        analysis_id: &str,
        message: &str,
    ) -> Result<ProgressRecord> {
        let record = self.load_for_write(analysis_id).await?;
        match detect_step(&record, message) {
            Some(index) if index > record.current_step_index => {
                self.advance_to(analysis_id, index, message).await
            }
            _ => {
                self.advance(
                    analysis_id,
                    record.current_step_index,
                    &record.current_step_name,
                    &record.current_step_description,
                    message,
                )
                .await
            }
        }
    }

    /// Mark the analysis completed and attach its results
    ///
    /// Completing an already completed record with the same results is a
    /// no-op; different results are rejected, as is completing a failed one.
    pub async fn complete(&self, analysis_id: &str, raw_results: Value) -> Result<ProgressRecord> {
        let mut record = self.load_for_write(analysis_id).await?;
        let raw_results = Some(raw_results);
        match record.status {
            ProgressStatus::Pending | ProgressStatus::Running => {}
            ProgressStatus::Completed if record.raw_results == raw_results => {
                debug!(analysis_id, "Analysis already completed");
                return Ok(record);
            }
            from => {
                return Err(ProgressError::InvalidTransition {
                    analysis_id: analysis_id.to_string(),
                    from,
                    to: ProgressStatus::Completed,
                });
            }
        }

        let now = self.clock.now();
        let elapsed = seconds_between(record.start_time, now);
        record.status = ProgressStatus::Completed;
        record.current_step_index = record.total_steps;
        record.progress_percentage = 100.0;
        record.last_message = "Analysis completed".to_string();
        record.elapsed_time = elapsed;
        record.estimated_total_time = elapsed;
        record.remaining_time = 0.0;
        record.raw_results = raw_results;
        record.last_update = now;

        info!(analysis_id, elapsed_secs = elapsed, "Analysis completed");
        self.commit(record.clone()).await;
        Ok(record)
    }

    /// Mark the analysis failed
    ///
    /// Progress and the last estimate are kept as they were.
    pub async fn fail(&self, analysis_id: &str, error_message: &str) -> Result<ProgressRecord> {
        let mut record = self.load_for_write(analysis_id).await?;
        if record.is_terminal() {
            return Err(ProgressError::InvalidTransition {
                analysis_id: analysis_id.to_string(),
                from: record.status,
                to: ProgressStatus::Failed,
            });
        }

        let now = self.clock.now();
        let elapsed = seconds_between(record.start_time, now);
        record.status = ProgressStatus::Failed;
        record.last_message = error_message.to_string();
        record.elapsed_time = elapsed;
        record.estimated_total_time = record.estimated_total_time.max(elapsed);
        record.remaining_time = 0.0;
        record.last_update = now;

        warn!(analysis_id, error = error_message, "Analysis failed");
        self.commit(record.clone()).await;
        Ok(record)
    }

    /// Current view of an analysis, with live timing while it runs
    pub async fn get(&self, analysis_id: &str) -> Option<ProgressRecord> {
        let record = self.current(analysis_id).await?;
        Some(record.live_view(self.clock.now()))
    }

    /// Id of the most recently updated analysis in the store
    pub async fn latest_analysis_id(&self) -> Option<String> {
        let records = match self.store.records().await {
            Ok(records) => records,
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Listing progress records failed");
                self.owned.lock().await.values().cloned().collect()
            }
        };

        records
            .into_iter()
            .max_by_key(|r| r.last_update)
            .map(|r| r.analysis_id)
    }

    /// Every record in the store
    pub async fn list(&self) -> Vec<ProgressRecord> {
        let now = self.clock.now();
        match self.store.records().await {
            Ok(records) => records.iter().map(|r| r.live_view(now)).collect(),
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Listing progress records failed");
                Vec::new()
            }
        }
    }

    /// Delete an analysis record; returns whether one existed
    pub async fn purge(&self, analysis_id: &str) -> bool {
        let owned = self.owned.lock().await.remove(analysis_id).is_some();
        match self.store.remove(analysis_id).await {
            Ok(removed) => removed || owned,
            Err(e) => {
                warn!(analysis_id, store = self.store.name(), error = %e, "Purging progress record failed");
                owned
            }
        }
    }

    /// Store copy, or the local one when the store cannot serve it
    async fn current(&self, analysis_id: &str) -> Option<ProgressRecord> {
        match self.store.load(analysis_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(analysis_id, store = self.store.name(), error = %e, "Reading progress record failed");
                self.owned.lock().await.get(analysis_id).cloned()
            }
        }
    }

    /// Local copy first, then whatever the store holds
    async fn load_for_write(&self, analysis_id: &str) -> Result<ProgressRecord> {
        if let Some(record) = self.owned.lock().await.get(analysis_id).cloned() {
            return Ok(record);
        }
        self.current(analysis_id)
            .await
            .ok_or_else(|| ProgressError::NotFound(analysis_id.to_string()))
    }

    async fn commit(&self, record: ProgressRecord) {
        let mut owned = self.owned.lock().await;
        match self.store.save(&record).await {
            Ok(()) if record.is_terminal() => {
                owned.remove(&record.analysis_id);
            }
            Ok(()) => {
                owned.insert(record.analysis_id.clone(), record);
            }
            Err(e) => {
                warn!(
                    analysis_id = %record.analysis_id,
                    store = self.store.name(),
                    error = %e,
                    "Persisting progress failed; keeping local copy"
                );
                owned.insert(record.analysis_id.clone(), record);
            }
        }
    }
}

/// Planned step a progress message refers to
fn detect_step(record: &ProgressRecord, message: &str) -> Option<usize> {
    let message = message.to_lowercase();
    if message.contains("tool call") {
        return None;
    }
    if message.contains("module completed") || message.contains("module finished") {
        let last = record.total_steps.saturating_sub(1);
        return Some((record.current_step_index + 1).min(last));
    }

    let names: Vec<String> = record.steps.iter().map(|s| s.name.to_lowercase()).collect();
    names
        .iter()
        .position(|name| message.contains(name.as_str()))
        .or_else(|| {
            // leading word of a step name, e.g. "market" for "Market analysis"
            names
                .iter()
                .enumerate()
                .skip(record.current_step_index)
                .find(|(_, name)| leading_word(name).is_some_and(|word| message.contains(word)))
                .map(|(index, _)| index)
        })
}

fn leading_word(name: &str) -> Option<&str> {
    name.split_whitespace().next()
}
