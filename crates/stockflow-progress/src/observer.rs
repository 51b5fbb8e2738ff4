//! Bounded polling of a progress record from another process

use crate::config::ProgressConfig;
use crate::record::{ProgressRecord, ProgressStatus};
use crate::tracker::ProgressTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// What an observer can show at one poll
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressView {
    /// No record yet, the analysis may not have started
    Unavailable { analysis_id: String },
    Live(ProgressRecord),
}

/// Why an observation ended
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationOutcome {
    Completed(ProgressRecord),
    Failed(ProgressRecord),
    /// The time limit ran out before a terminal state was seen
    Stalled {
        last_seen: Option<ProgressRecord>,
        waited: Duration,
    },
}

/// Re-reads one analysis at a fixed interval until it finishes or time runs out
///
/// The observer only reads. Running out of time is reported as
/// [`ObservationOutcome::Stalled`] and leaves the record untouched.
pub struct ProgressObserver {
    tracker: Arc<ProgressTracker>,
    poll_interval: Duration,
    max_duration: Duration,
}

impl ProgressObserver {
    pub fn new(tracker: Arc<ProgressTracker>, config: &ProgressConfig) -> Self {
        Self {
            tracker,
            poll_interval: config.poll_interval,
            max_duration: config.max_observation,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = limit;
        self
    }

    /// One read, mapped to a view
    pub async fn snapshot(&self, analysis_id: &str) -> ProgressView {
        match self.tracker.get(analysis_id).await {
            Some(record) => ProgressView::Live(record),
            None => ProgressView::Unavailable {
                analysis_id: analysis_id.to_string(),
            },
        }
    }

    /// Poll `analysis_id`, handing every view to `render`
    pub async fn observe<F>(&self, analysis_id: &str, mut render: F) -> ObservationOutcome
    where
        F: FnMut(&ProgressView),
    {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = None;

        loop {
            ticker.tick().await;

            let view = self.snapshot(analysis_id).await;
            render(&view);

            if let ProgressView::Live(record) = view {
                match record.status {
                    ProgressStatus::Completed => return ObservationOutcome::Completed(record),
                    ProgressStatus::Failed => return ObservationOutcome::Failed(record),
                    ProgressStatus::Pending | ProgressStatus::Running => {
                        debug!(
                            analysis_id,
                            percentage = record.progress_percentage,
                            "Analysis still running"
                        );
                        last_seen = Some(record);
                    }
                }
            }

            let waited = started.elapsed();
            if waited >= self.max_duration {
                warn!(
                    analysis_id,
                    waited_secs = waited.as_secs(),
                    "Stopped observing analysis without a final state"
                );
                return ObservationOutcome::Stalled { last_seen, waited };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProgressStore;
    use serde_json::json;

    fn setup() -> (Arc<ProgressTracker>, ProgressObserver) {
        let tracker = Arc::new(ProgressTracker::new(Arc::new(MemoryProgressStore::new())));
        let observer = ProgressObserver::new(tracker.clone(), &ProgressConfig::default())
            .poll_interval(Duration::from_secs(1))
            .max_duration(Duration::from_secs(10));
        (tracker, observer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_until_completed() {
        let (tracker, observer) = setup();
        tracker.create("a1", 2).await.unwrap();

        let writer = tracker.clone();
        let pipeline = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            writer.advance("a1", 1, "Fetch", "", "fetching").await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            writer.complete("a1", json!({"decision": "BUY"})).await.unwrap();
        });

        let mut percentages = Vec::new();
        let outcome = observer
            .observe("a1", |view| {
                if let ProgressView::Live(record) = view {
                    percentages.push(record.progress_percentage);
                }
            })
            .await;
        pipeline.await.unwrap();

        match outcome {
            ObservationOutcome::Completed(record) => {
                assert_eq!(record.raw_results, Some(json!({"decision": "BUY"})));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percentages.last(), Some(&100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_failure() {
        let (tracker, observer) = setup();
        tracker.create("a1", 2).await.unwrap();
        tracker.fail("a1", "no data").await.unwrap();

        let outcome = observer.observe("a1", |_| {}).await;
        assert!(matches!(outcome, ObservationOutcome::Failed(r) if r.last_message == "no data"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_analysis_left_untouched() {
        let (tracker, observer) = setup();
        tracker.create("a1", 4).await.unwrap();
        tracker.advance("a1", 1, "Fetch", "", "").await.unwrap();

        let mut polls = 0;
        let outcome = observer.observe("a1", |_| polls += 1).await;

        match outcome {
            ObservationOutcome::Stalled { last_seen, waited } => {
                assert_eq!(last_seen.unwrap().current_step_index, 1);
                assert!(waited >= Duration::from_secs(10));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(polls >= 10);
        assert_eq!(tracker.get("a1").await.unwrap().status, ProgressStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_analysis_renders_unavailable() {
        let (_, observer) = setup();

        let mut unavailable = 0;
        let outcome = observer
            .observe("missing_id", |view| {
                if matches!(view, ProgressView::Unavailable { .. }) {
                    unavailable += 1;
                }
            })
            .await;

        assert!(unavailable > 0);
        assert!(matches!(
            outcome,
            ObservationOutcome::Stalled { last_seen: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_snapshot() {
        let (tracker, observer) = setup();
        assert_eq!(
            observer.snapshot("a1").await,
            ProgressView::Unavailable {
                analysis_id: "a1".to_string()
            }
        );

        tracker.create("a1", 3).await.unwrap();
        assert!(matches!(observer.snapshot("a1").await, ProgressView::Live(_)));
    }
}
