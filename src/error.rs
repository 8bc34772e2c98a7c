//! Error types for workflow analysis operations.
//!
//! Defines error types for each subsystem:
//! - Dataset construction and CSV persistence
//! - Workflow summary ingestion
//! - Column reconciliation
//! - Historical store loading and merging
//! - Modeling, result processing, structural analysis and reporting

use std::path::PathBuf;

use thiserror::Error;

use crate::dataset::Granularity;

/// Errors raised while building or reshaping a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Row has {actual} values but {expected} were expected")]
    RowWidth { expected: usize, actual: usize },

    #[error("Unknown columns: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),
}

/// Errors raised while reading or writing CSV files.
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Failed to replace file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// The workflow summary could not be turned into run records.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read input file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required key '{0}'")]
    MissingKey(String),

    #[error("Malformed value for '{key}': {reason}")]
    MalformedValue { key: String, reason: String },
}

/// A requested feature or label is not a column of the current run.
#[derive(Debug, Clone, Error)]
#[error(
    "Requested {granularity} columns not found in the input data: {}",
    .missing.join(", ")
)]
pub struct ColumnMismatchError {
    pub granularity: Granularity,
    pub missing: Vec<String>,
}

/// Errors raised while loading or persisting historical data.
#[derive(Debug, Error)]
#[error("Historical data at {path}: {source}")]
pub struct HistoryError {
    pub path: PathBuf,
    #[source]
    pub source: TabularError,
}

/// Errors raised by the predictive model stage.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Label column '{0}' is missing from the historical data")]
    MissingLabel(String),

    #[error("Invalid value in column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Not enough data to train on: {0}")]
    InsufficientData(String),
}

/// Errors raised while processing model results.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Prediction for '{label}' has {actual} rows but the run has {expected}")]
    RowCountMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

/// Errors raised by the structural analysis stage.
#[derive(Debug, Error)]
pub enum StructureError {
    #[error("No task key column found (expected one of: {})", .0.join(", "))]
    MissingKeyColumn(Vec<String>),
}

/// Errors raised while writing the feedback report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Template rendering error: {0}")]
    Template(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] TabularError),
}
