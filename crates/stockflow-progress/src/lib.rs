//! Cross-process progress tracking for long-running analyses
//!
//! The pipeline running an analysis writes [`ProgressRecord`]s through a
//! [`ProgressTracker`]; a dashboard in another process reads the same store
//! through its own tracker, usually wrapped in a [`ProgressObserver`]. The
//! store is the only channel between the two.
//!
//! # Example
//!
//! ```rust,ignore
//! use stockflow_progress::{AnalysisPlan, ProgressConfig, ProgressTracker};
//!
//! let tracker = ProgressTracker::from_config(&ProgressConfig::from_env()?)?;
//! let plan = AnalysisPlan::builder()
//!     .analysts(["market", "fundamentals"])
//!     .llm_provider("deepseek")
//!     .build()?;
//! let market = plan.find_step("market");
//!
//! tracker.create_with_plan("AAPL-20240301", plan).await?;
//! if let Some(step) = market {
//!     tracker.advance_to("AAPL-20240301", step, "market analyst started").await?;
//! }
//! tracker.complete("AAPL-20240301", report).await?;
//! ```

pub mod config;
pub mod error;
pub mod estimator;
pub mod observer;
pub mod plan;
pub mod record;
pub mod store;
pub mod tracker;

pub use config::{ProgressConfig, StoreBackend};
pub use error::{ProgressError, Result};
pub use estimator::{TimeEstimator, estimate_total_time};
pub use observer::{ObservationOutcome, ProgressObserver, ProgressView};
pub use plan::{AnalysisPlan, ResearchDepth};
pub use record::{PlannedStep, ProgressRecord, ProgressStatus, format_duration};
pub use store::{FileProgressStore, MemoryProgressStore, ProgressStore, SqliteProgressStore};
pub use tracker::ProgressTracker;
