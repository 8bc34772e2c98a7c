//! Built-in analysis stages.
//!
//! - **model**: nearest-neighbour predictions and feature importances
//! - **results**: enriches the current run with predictions and ranks features
//! - **topology**: per-task and per-branch comparisons against history
//!
//! Each stage is a plain function; the pipeline wires them through
//! [`StageAdapters`](crate::pipeline::StageAdapters).

pub mod model;
pub mod results;
pub mod topology;

pub use model::{predict, FeatureImportance, LabelKind, LabelPrediction, Predictions};
pub use results::{process, ProcessedResults};
pub use topology::{analyse, BranchStat, StructuralStats, TaskStat};
