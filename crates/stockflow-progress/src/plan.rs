//! Step plans and duration estimates for multi-agent analyses

use crate::error::{ProgressError, Result};
use crate::record::PlannedStep;
use serde::{Deserialize, Serialize};

/// How much debate and risk review an analysis runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl ResearchDepth {
    /// Map a 1-3 level; anything else is rejected
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Quick),
            2 => Some(Self::Standard),
            3 => Some(Self::Deep),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::Quick => 1,
            Self::Standard => 2,
            Self::Deep => 3,
        }
    }

    /// Observed seconds per analyst at this depth
    fn seconds_per_analyst(self) -> f64 {
        match self {
            Self::Quick => 120.0,
            Self::Standard => 180.0,
            Self::Deep => 240.0,
        }
    }

    /// Extra tool calls and reasoning at deeper levels
    fn duration_multiplier(self) -> f64 {
        match self {
            Self::Quick => 0.8,
            Self::Standard => 1.0,
            Self::Deep => 1.3,
        }
    }
}

const BASE_SECONDS: f64 = 60.0;
const ANALYST_SHARE: f64 = 0.6;

/// Ordered steps of one analysis plus an upfront duration estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    steps: Vec<PlannedStep>,
    estimated_duration: f64,
}

impl AnalysisPlan {
    pub fn builder() -> AnalysisPlanBuilder {
        AnalysisPlanBuilder::default()
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Seconds expected before any step has been observed
    pub fn estimated_duration(&self) -> f64 {
        self.estimated_duration
    }

    /// Index of the first step whose name contains `keyword` (case-insensitive)
    pub fn find_step(&self, keyword: &str) -> Option<usize> {
        let keyword = keyword.to_lowercase();
        self.steps
            .iter()
            .position(|step| step.name.to_lowercase().contains(&keyword))
    }

    pub(crate) fn into_steps(self) -> Vec<PlannedStep> {
        self.steps
    }
}

/// Builder for [`AnalysisPlan`]
#[derive(Debug, Default)]
pub struct AnalysisPlanBuilder {
    analysts: Vec<String>,
    depth: ResearchDepth,
    llm_provider: Option<String>,
}

impl AnalysisPlanBuilder {
    /// Add one analyst (`market`, `fundamentals`, `news`, ...)
    pub fn analyst(mut self, analyst: impl Into<String>) -> Self {
        self.analysts.push(analyst.into());
        self
    }

    pub fn analysts<I, S>(mut self, analysts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analysts.extend(analysts.into_iter().map(Into::into));
        self
    }

    pub fn research_depth(mut self, depth: ResearchDepth) -> Self {
        self.depth = depth;
        self
    }

    /// LLM provider name; known providers adjust the duration estimate
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm_provider = Some(provider.into());
        self
    }

    pub fn build(self) -> Result<AnalysisPlan> {
        if self.analysts.is_empty() {
            return Err(ProgressError::InvalidPlan(
                "at least one analyst is required".to_string(),
            ));
        }
        if let Some(blank) = self.analysts.iter().find(|a| a.trim().is_empty()) {
            return Err(ProgressError::InvalidPlan(format!("blank analyst name {blank:?}")));
        }

        let steps = plan_steps(&self.analysts, self.depth);
        let estimated_duration = estimate_duration(
            self.analysts.len(),
            self.depth,
            self.llm_provider.as_deref(),
        );

        Ok(AnalysisPlan {
            steps,
            estimated_duration,
        })
    }
}

fn plan_steps(analysts: &[String], depth: ResearchDepth) -> Vec<PlannedStep> {
    let mut steps = vec![
        PlannedStep::new("Preparation", "Validate the ticker and check data source availability", 0.05),
        PlannedStep::new("Environment check", "Check API key configuration", 0.02),
        PlannedStep::new("Cost estimation", "Estimate API call cost for the chosen depth", 0.01),
        PlannedStep::new("Parameter setup", "Configure analysis parameters and model selection", 0.02),
        PlannedStep::new("Engine start", "Initialize the analysis engine", 0.05),
    ];

    let analyst_weight = ANALYST_SHARE / analysts.len() as f64;
    steps.extend(analysts.iter().map(|analyst| {
        let (name, description) = analyst_step(analyst);
        PlannedStep::new(name, description, analyst_weight)
    }));

    if depth != ResearchDepth::Quick {
        steps.extend([
            PlannedStep::new("Bull case", "Argue the upside and investment opportunity", 0.06),
            PlannedStep::new("Bear case", "Argue the downside and investment risk", 0.06),
            PlannedStep::new("Synthesis", "Reconcile bull and bear views into a balanced call", 0.05),
        ]);
    }

    steps.push(PlannedStep::new(
        "Trading decision",
        "Turn the analysis into a concrete buy or sell recommendation",
        0.06,
    ));

    if depth == ResearchDepth::Deep {
        steps.extend([
            PlannedStep::new("Aggressive strategy", "Assess high-risk high-return strategies", 0.03),
            PlannedStep::new("Conservative strategy", "Assess low-risk defensive strategies", 0.03),
            PlannedStep::new("Balanced strategy", "Assess strategies balancing risk and return", 0.03),
            PlannedStep::new("Risk control", "Define risk limits and stop-loss rules", 0.04),
        ]);
    } else {
        steps.push(PlannedStep::new(
            "Risk warning",
            "Identify the main investment risks",
            0.05,
        ));
    }

    steps.push(PlannedStep::new(
        "Report",
        "Collect every result into the final investment report",
        0.04,
    ));

    let total: f64 = steps.iter().map(|s| s.weight).sum();
    for step in &mut steps {
        step.weight /= total;
    }
    steps
}

fn analyst_step(analyst: &str) -> (String, String) {
    let known = match analyst {
        "market" => Some(("Market analysis", "Price trend, volume and market activity")),
        "fundamentals" => Some(("Fundamentals analysis", "Financial health, profitability and growth")),
        "technical" => Some(("Technical analysis", "Chart patterns, indicators, support and resistance")),
        "sentiment" => Some(("Sentiment analysis", "Market mood and investor psychology")),
        "news" => Some(("News analysis", "Impact of news, filings and industry events")),
        "social_media" => Some(("Social media analysis", "Online discussion and retail sentiment")),
        "risk" => Some(("Risk analysis", "Identify and grade investment risks")),
        _ => None,
    };

    match known {
        Some((name, description)) => (name.to_string(), description.to_string()),
        None => (
            format!("{analyst} analysis"),
            format!("Specialist {analyst} analysis"),
        ),
    }
}

fn provider_multiplier(provider: Option<&str>) -> f64 {
    match provider.map(str::to_lowercase).as_deref() {
        Some("deepseek") => 0.7,
        Some("google") => 1.3,
        _ => 1.0,
    }
}

/// Upfront estimate in seconds from analyst count, depth and provider
pub fn estimate_duration(analysts: usize, depth: ResearchDepth, llm_provider: Option<&str>) -> f64 {
    let analyst_time = analysts as f64 * depth.seconds_per_analyst();
    (BASE_SECONDS + analyst_time) * provider_multiplier(llm_provider) * depth.duration_multiplier()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_sum(plan: &AnalysisPlan) -> f64 {
        plan.steps().iter().map(|s| s.weight).sum()
    }

    #[test]
    fn test_standard_plan_steps() {
        let plan = AnalysisPlan::builder()
            .analysts(["market", "fundamentals"])
            .build()
            .unwrap();

        // 5 setup, 2 analysts, 3 debate, decision, risk warning, report
        assert_eq!(plan.total_steps(), 13);
        assert_eq!(plan.steps()[5].name, "Market analysis");
        assert_eq!(plan.steps()[6].name, "Fundamentals analysis");
        assert!(plan.find_step("bull case").is_some());
        assert!(plan.find_step("risk warning").is_some());
        assert!(plan.find_step("risk control").is_none());
        assert!((weight_sum(&plan) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_quick_and_deep_plans() {
        let quick = AnalysisPlan::builder()
            .analyst("market")
            .research_depth(ResearchDepth::Quick)
            .build()
            .unwrap();
        assert_eq!(quick.total_steps(), 9);
        assert!(quick.find_step("synthesis").is_none());

        let deep = AnalysisPlan::builder()
            .analyst("market")
            .research_depth(ResearchDepth::Deep)
            .build()
            .unwrap();
        assert_eq!(deep.total_steps(), 15);
        assert_eq!(deep.find_step("report"), Some(14));
        assert!((weight_sum(&deep) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_analyst_gets_generic_step() {
        let plan = AnalysisPlan::builder().analyst("macro").build().unwrap();
        assert_eq!(plan.find_step("macro analysis"), Some(5));
    }

    #[test]
    fn test_plan_requires_analysts() {
        assert!(matches!(
            AnalysisPlan::builder().build(),
            Err(ProgressError::InvalidPlan(_))
        ));
        assert!(AnalysisPlan::builder().analyst("  ").build().is_err());
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration(2, ResearchDepth::Standard, None), 420.0);
        assert_eq!(estimate_duration(1, ResearchDepth::Quick, Some("dashscope")), 144.0);
        let deep = estimate_duration(3, ResearchDepth::Deep, Some("DeepSeek"));
        assert!((deep - 780.0 * 0.7 * 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_research_depth_levels() {
        assert_eq!(ResearchDepth::from_level(3), Some(ResearchDepth::Deep));
        assert_eq!(ResearchDepth::from_level(0), None);
        assert_eq!(ResearchDepth::Quick.level(), 1);
    }
}
