//! Total duration estimates from observed step progress

use crate::record::ProgressRecord;

/// Normalized per-step weights
#[derive(Debug, Clone, PartialEq)]
pub struct StepWeights(Vec<f64>);

impl StepWeights {
    /// `None` when the weights are empty or cannot be normalized
    pub fn new(weights: &[f64]) -> Option<Self> {
        if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return None;
        }
        Some(Self(weights.iter().map(|w| w / sum).collect()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Share of the total work done once `completed_steps` steps finished
    pub fn completed_fraction(&self, completed_steps: usize) -> f64 {
        self.0.iter().take(completed_steps).sum::<f64>().min(1.0)
    }
}

/// Linear projection of the total duration
///
/// The average step time so far is extrapolated over all steps. Before any
/// step has finished the elapsed time stands in for one step. The result is
/// never below `elapsed`.
pub fn estimate_total_time(total_steps: usize, current_step_index: usize, elapsed: f64) -> f64 {
    let elapsed = elapsed.max(0.0);
    let done = current_step_index.max(1) as f64;
    let projected = elapsed / done * total_steps as f64;
    projected.max(elapsed)
}

/// Projection through step weights, falling back to linear with no
/// weighted progress yet
pub fn estimate_weighted(weights: &StepWeights, current_step_index: usize, elapsed: f64) -> f64 {
    let elapsed = elapsed.max(0.0);
    let fraction = weights.completed_fraction(current_step_index);
    if fraction <= 0.0 {
        return estimate_total_time(weights.len(), current_step_index, elapsed);
    }
    (elapsed / fraction).max(elapsed)
}

/// Strategy used by the tracker on every step update
#[derive(Debug, Clone, PartialEq)]
pub enum TimeEstimator {
    Linear,
    Weighted(StepWeights),
}

impl TimeEstimator {
    /// Weighted when the record carries a plan with usable weights
    pub fn for_record(record: &ProgressRecord) -> Self {
        record
            .step_weights()
            .and_then(|w| StepWeights::new(&w))
            .filter(|w| w.len() == record.total_steps)
            .map_or(Self::Linear, Self::Weighted)
    }

    pub fn estimate(&self, total_steps: usize, current_step_index: usize, elapsed: f64) -> f64 {
        match self {
            Self::Linear => estimate_total_time(total_steps, current_step_index, elapsed),
            Self::Weighted(weights) => estimate_weighted(weights, current_step_index, elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PlannedStep;
    use chrono::Utc;

    #[test]
    fn test_linear_estimate() {
        assert_eq!(estimate_total_time(4, 1, 10.0), 40.0);
        assert_eq!(estimate_total_time(4, 2, 10.0), 20.0);
        assert_eq!(estimate_total_time(4, 4, 30.0), 30.0);
    }

    #[test]
    fn test_linear_estimate_before_first_step() {
        assert_eq!(estimate_total_time(4, 0, 5.0), 20.0);
        assert_eq!(estimate_total_time(4, 0, 0.0), 0.0);
    }

    #[test]
    fn test_estimate_never_below_elapsed() {
        assert_eq!(estimate_total_time(1, 3, 9.0), 9.0);
        assert_eq!(estimate_total_time(0, 0, 9.0), 9.0);
    }

    #[test]
    fn test_estimate_monotonic_in_elapsed() {
        let mut previous = 0.0;
        for tick in 0..50 {
            let estimate = estimate_total_time(7, 3, f64::from(tick) * 0.5);
            assert!(estimate >= previous);
            previous = estimate;
        }
    }

    #[test]
    fn test_step_weights_normalized() {
        let weights = StepWeights::new(&[1.0, 1.0, 2.0]).unwrap();
        assert_eq!(weights.completed_fraction(0), 0.0);
        assert_eq!(weights.completed_fraction(2), 0.5);
        assert_eq!(weights.completed_fraction(10), 1.0);

        assert!(StepWeights::new(&[]).is_none());
        assert!(StepWeights::new(&[0.0, 0.0]).is_none());
        assert!(StepWeights::new(&[1.0, -1.0]).is_none());
    }

    #[test]
    fn test_weighted_estimate() {
        let weights = StepWeights::new(&[1.0, 1.0, 2.0]).unwrap();
        assert_eq!(estimate_weighted(&weights, 2, 30.0), 60.0);
        // no finished weight yet
        assert_eq!(estimate_weighted(&weights, 0, 10.0), 30.0);
    }

    #[test]
    fn test_estimator_for_record() {
        let mut record = crate::record::ProgressRecord::new("a1", 2, Utc::now());
        assert_eq!(TimeEstimator::for_record(&record), TimeEstimator::Linear);

        record.steps = vec![
            PlannedStep::new("one", "", 3.0),
            PlannedStep::new("two", "", 1.0),
        ];
        let estimator = TimeEstimator::for_record(&record);
        assert!(matches!(estimator, TimeEstimator::Weighted(_)));
        assert_eq!(estimator.estimate(2, 1, 30.0), 40.0);

        record.total_steps = 3;
        assert_eq!(TimeEstimator::for_record(&record), TimeEstimator::Linear);
    }
}
