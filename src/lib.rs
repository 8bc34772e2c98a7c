//! workflow_analysis: predictive and structural feedback on workflow runs.
//!
//! This library ingests workflow execution summaries, compares them with a
//! user's historical runs, writes a feedback report and appends every run to
//! the user's historical datasets.

// Core modules
pub mod analysis;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod storage;

// Re-export commonly used types
pub use dataset::{Dataset, Granularity, Value};
pub use error::{
    ColumnMismatchError, DatasetError, HistoryError, IngestError, ModelError, ProcessError,
    ReportError, StructureError, TabularError,
};
pub use pipeline::{AnalysisConfig, AnalysisPipeline, RunSummary};
