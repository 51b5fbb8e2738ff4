//! Progress record model shared by writers and readers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ceiling on the reported percentage until an analysis completes
pub const MAX_RUNNING_PERCENTAGE: f64 = 99.9;

/// Lifecycle state of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ProgressStatus {
    /// Completed and failed records never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a planned analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub name: String,
    pub description: String,
    /// Relative share of the total running time
    pub weight: f64,
}

impl PlannedStep {
    pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight,
        }
    }
}

/// Snapshot of one analysis as persisted and read back by observers
///
/// Durations are seconds. `elapsed_time` and `remaining_time` are refreshed on
/// every write and recomputed by [`ProgressRecord::live_view`] on read while
/// the analysis is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub analysis_id: String,
    pub status: ProgressStatus,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub current_step_name: String,
    pub current_step_description: String,
    pub last_message: String,
    pub progress_percentage: f64,
    pub start_time: DateTime<Utc>,
    pub elapsed_time: f64,
    pub estimated_total_time: f64,
    pub remaining_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_results: Option<Value>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<PlannedStep>,
}

impl ProgressRecord {
    /// Fresh pending record
    pub fn new(analysis_id: impl Into<String>, total_steps: usize, now: DateTime<Utc>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            status: ProgressStatus::Pending,
            current_step_index: 0,
            total_steps,
            current_step_name: String::new(),
            current_step_description: String::new(),
            last_message: String::new(),
            progress_percentage: 0.0,
            start_time: now,
            elapsed_time: 0.0,
            estimated_total_time: 0.0,
            remaining_time: 0.0,
            raw_results: None,
            last_update: now,
            steps: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Step weights, when the record was created from a plan
    pub fn step_weights(&self) -> Option<Vec<f64>> {
        (!self.steps.is_empty()).then(|| self.steps.iter().map(|s| s.weight).collect())
    }

    /// The record as an observer should see it at `now`
    ///
    /// Running records get a live elapsed time and an estimate that never
    /// drops below it. Other states are returned as stored.
    pub fn live_view(&self, now: DateTime<Utc>) -> Self {
        let mut view = self.clone();
        if view.status == ProgressStatus::Running {
            let elapsed = seconds_between(view.start_time, now).max(view.elapsed_time);
            view.elapsed_time = elapsed;
            view.estimated_total_time = view.estimated_total_time.max(elapsed);
            view.remaining_time = remaining(view.estimated_total_time, elapsed);
        }
        view
    }
}

/// Non-negative seconds from `start` to `end`
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

pub(crate) fn remaining(estimated_total: f64, elapsed: f64) -> f64 {
    (estimated_total - elapsed).max(0.0)
}

/// Human readable duration: `42.0s`, `3.5m` or `1.2h`
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}
