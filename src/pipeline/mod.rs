//! Pipeline orchestration for workflow analysis.
//!
//! # Architecture
//!
//! - **Paths**: per-user directory layout, created on demand
//! - **Config**: feature selections, label maps and model settings
//! - **Stages**: stage identities and swappable stage implementations
//! - **Orchestrator**: runs the stages in order and records their outcomes
//!
//! # Pipeline Flow
//!
//! 1. **Data pre-processing**: the workflow summary becomes task and workflow
//!    run records
//! 2. **Feature reconciliation**: current and historical data are narrowed to
//!    the requested features and labels
//! 3. **Predictive model**: labels are predicted from historical data
//! 4. **Results analysis**: predictions are joined back and features ranked
//! 5. **Topological analysis**: tasks and branches are compared with history
//! 6. **Feedback report**: figures and a Markdown report are written
//! 7. **Historical data update**: the unfiltered run records are appended to
//!    history
//!
//! Stages 2-6 run only when both historical files exist, and a failure in one
//! of them skips the rest. Stage 7 always runs once ingestion has succeeded.
//!
//! # Example
//!
//! ```rust,ignore
//! use workflow_analysis::pipeline::{AnalysisConfig, AnalysisPipeline, FeatureSelection};
//!
//! let config = AnalysisConfig::new("/srv/was", "alice", "uploads/run.json")
//!     .with_task_features(FeatureSelection::of(["executionStatistics.executionDurationSinceStart"]));
//!
//! let summary = AnalysisPipeline::new(config)?.run()?;
//! println!("{:?}", summary.analysis);
//! ```

pub mod config;
pub mod orchestrator;
pub mod paths;
pub mod stages;

pub use config::{
    AnalysisConfig, ConfigError, FeatureSelection, GranularitySelection, LabelMap, ModelSettings,
    SelectionFile,
};
pub use orchestrator::{
    AnalysisError, AnalysisOutcome, AnalysisPipeline, PersistOutcome, PipelineError, RunSummary,
    StageRecord, StageStatus,
};
pub use paths::{PathsError, PathsMap};
pub use stages::{Stage, StageAdapters};
