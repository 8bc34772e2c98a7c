//! Stage identities and the adapters that implement them.
//!
//! Every analysis stage is a named function interface with typed inputs and
//! outputs. [`StageAdapters::default`] wires the built-in implementations;
//! tests swap individual functions to exercise failure paths.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analysis::{self, Predictions, ProcessedResults, StructuralStats};
use crate::dataset::Dataset;
use crate::error::{IngestError, ModelError, ProcessError, ReportError, StructureError};
use crate::ingest::{self, RunRecords};
use crate::report::{self, ReportInputs};

use super::config::{LabelMap, ModelSettings};

/// Ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Reconcile,
    Model,
    ProcessResults,
    StructuralAnalysis,
    Report,
    Persist,
}

impl Stage {
    /// All stages in execution order.
    pub const ORDER: [Stage; 7] = [
        Stage::Ingest,
        Stage::Reconcile,
        Stage::Model,
        Stage::ProcessResults,
        Stage::StructuralAnalysis,
        Stage::Report,
        Stage::Persist,
    ];

    /// The analysis stages that need historical data.
    pub const ANALYSIS: [Stage; 5] = [
        Stage::Reconcile,
        Stage::Model,
        Stage::ProcessResults,
        Stage::StructuralAnalysis,
        Stage::Report,
    ];

    /// 1-based position in the pipeline.
    pub fn number(&self) -> usize {
        match self {
            Stage::Ingest => 1,
            Stage::Reconcile => 2,
            Stage::Model => 3,
            Stage::ProcessResults => 4,
            Stage::StructuralAnalysis => 5,
            Stage::Report => 6,
            Stage::Persist => 7,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Ingest => write!(f, "data pre-processing"),
            Stage::Reconcile => write!(f, "feature reconciliation"),
            Stage::Model => write!(f, "predictive model"),
            Stage::ProcessResults => write!(f, "results analysis"),
            Stage::StructuralAnalysis => write!(f, "topological analysis"),
            Stage::Report => write!(f, "feedback report"),
            Stage::Persist => write!(f, "historical data update"),
        }
    }
}

pub type IngestFn = fn(&Path) -> Result<RunRecords, IngestError>;

pub type ModelFn =
    fn(&Dataset, &Dataset, &LabelMap, &ModelSettings) -> Result<Predictions, ModelError>;

pub type ProcessFn =
    fn(&Predictions, &Dataset, &ModelSettings) -> Result<ProcessedResults, ProcessError>;

pub type StructureFn =
    fn(&Dataset, &Dataset, &[String], &LabelMap) -> Result<StructuralStats, StructureError>;

pub type ReportFn = fn(&ReportInputs<'_>) -> Result<PathBuf, ReportError>;

/// One implementation per stage.
#[derive(Clone, Copy)]
pub struct StageAdapters {
    pub ingest: IngestFn,
    pub model: ModelFn,
    pub process: ProcessFn,
    pub structure: StructureFn,
    pub report: ReportFn,
}

impl Default for StageAdapters {
    fn default() -> Self {
        Self {
            ingest: ingest::parse_summary_file,
            model: analysis::predict,
            process: analysis::process,
            structure: analysis::analyse,
            report: report::produce_report,
        }
    }
}

impl StageAdapters {
    pub fn with_ingest(mut self, ingest: IngestFn) -> Self {
        self.ingest = ingest;
        self
    }

    pub fn with_model(mut self, model: ModelFn) -> Self {
        self.model = model;
        self
    }

    pub fn with_process(mut self, process: ProcessFn) -> Self {
        self.process = process;
        self
    }

    pub fn with_structure(mut self, structure: StructureFn) -> Self {
        self.structure = structure;
        self
    }

    pub fn with_report(mut self, report: ReportFn) -> Self {
        self.report = report;
        self
    }
}
