//! Pipeline sequencer for one workflow-analysis run.
//!
//! The `AnalysisPipeline` runs the stages in order:
//! - Ingest the workflow summary into run records
//! - Load the user's historical datasets
//! - Analyse (reconcile, model, process, structure, report) when both
//!   historical files exist
//! - Append the run to the historical datasets
//!
//! Analysis failures never prevent the run from being appended to history.
//! Only path preparation, ingestion and unreadable history abort the run.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dataset::{Dataset, Granularity};
use crate::error::{
    ColumnMismatchError, HistoryError, IngestError, ModelError, ProcessError, ReportError,
    StructureError,
};
use crate::ingest::RunRecords;
use crate::reconcile::reconcile;
use crate::report::ReportInputs;
use crate::storage::{HistoricalStore, HistoryPair};

use super::config::{AnalysisConfig, ConfigError};
use super::paths::{PathsError, PathsMap};
use super::stages::{Stage, StageAdapters};

/// Errors that abort a run before anything is persisted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Path setup failed: {0}")]
    Paths(#[from] PathsError),

    #[error("Data pre-processing failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Failed to load historical data: {0}")]
    History(#[from] HistoryError),
}

/// Errors raised by the analysis stages.
///
/// These are recorded on the [`RunSummary`]; they never stop the run from
/// being persisted.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Reconcile(#[from] ColumnMismatchError),

    #[error("Predictive model failed: {0}")]
    Model(#[from] ModelError),

    #[error("Results analysis failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Topological analysis failed: {0}")]
    Structure(#[from] StructureError),

    #[error("Feedback report failed: {0}")]
    Report(#[from] ReportError),
}

impl AnalysisError {
    /// Stage that raised the error.
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::Reconcile(_) => Stage::Reconcile,
            AnalysisError::Model(_) => Stage::Model,
            AnalysisError::Process(_) => Stage::ProcessResults,
            AnalysisError::Structure(_) => Stage::StructuralAnalysis,
            AnalysisError::Report(_) => Stage::Report,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Failed,
    Skipped,
}

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of the analysis stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed { report_path: PathBuf },
    NoHistory,
    Failed { stage: Stage, message: String },
}

/// Result of appending the run to one historical dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistOutcome {
    Saved {
        granularity: Granularity,
        path: PathBuf,
        rows: usize,
        columns: usize,
    },
    Failed {
        granularity: Granularity,
        path: PathBuf,
        message: String,
    },
}

impl PersistOutcome {
    pub fn granularity(&self) -> Granularity {
        match self {
            PersistOutcome::Saved { granularity, .. } | PersistOutcome::Failed { granularity, .. } => {
                *granularity
            }
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, PersistOutcome::Saved { .. })
    }
}

/// Summary of a completed run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub user: String,
    pub stages: Vec<StageRecord>,
    pub analysis: AnalysisOutcome,
    pub persisted: Vec<PersistOutcome>,
    /// The analysis error itself, for callers that need more than the message.
    #[serde(skip)]
    pub analysis_error: Option<AnalysisError>,
}

impl RunSummary {
    /// Status recorded for a stage.
    pub fn stage_status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|record| record.stage == stage)
            .map(|record| record.status)
    }

    pub fn report_path(&self) -> Option<&PathBuf> {
        match &self.analysis {
            AnalysisOutcome::Completed { report_path } => Some(report_path),
            _ => None,
        }
    }

    /// True when both granularities were written to history.
    pub fn persisted_all(&self) -> bool {
        self.persisted.len() == Granularity::ALL.len()
            && self.persisted.iter().all(PersistOutcome::is_saved)
    }
}

#[derive(Debug, Default)]
struct StageTracker {
    records: Vec<StageRecord>,
}

impl StageTracker {
    fn record(&mut self, stage: Stage, status: StageStatus, started: Instant, error: Option<String>) {
        self.records.push(StageRecord {
            stage,
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            error,
        });
    }

    fn skip(&mut self, stage: Stage) {
        self.records.push(StageRecord {
            stage,
            status: StageStatus::Skipped,
            elapsed_ms: 0,
            error: None,
        });
    }

    /// Marks every stage in `stages` that has no record yet as skipped.
    fn skip_remaining(&mut self, stages: &[Stage]) {
        for &stage in stages {
            if !self.records.iter().any(|r| r.stage == stage) {
                self.skip(stage);
            }
        }
    }

    /// Runs one stage, logging and timing it.
    fn run<T, E>(&mut self, stage: Stage, f: impl FnOnce() -> Result<T, E>) -> Result<T, AnalysisError>
    where
        E: Into<AnalysisError>,
    {
        info!(stage = stage.number(), "Initialising {} step...", stage);
        let started = Instant::now();
        match f() {
            Ok(value) => {
                self.record(stage, StageStatus::Completed, started, None);
                info!(stage = stage.number(), "{} step successful", stage);
                Ok(value)
            }
            Err(e) => {
                let e = e.into();
                error!(stage = stage.number(), error = %e, "{} step unsuccessful", stage);
                self.record(stage, StageStatus::Failed, started, Some(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Sequencer for the analysis stages.
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    adapters: StageAdapters,
}

impl AnalysisPipeline {
    /// Creates a pipeline with the built-in stage implementations.
    pub fn new(config: AnalysisConfig) -> Result<Self, PipelineError> {
        Self::with_adapters(config, StageAdapters::default())
    }

    /// Creates a pipeline with custom stage implementations.
    pub fn with_adapters(
        config: AnalysisConfig,
        adapters: StageAdapters,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, adapters })
    }

    /// Runs every stage for the configured user and input file.
    ///
    /// # Errors
    ///
    /// Fails without writing any history if the user's directories cannot be
    /// prepared, the input cannot be ingested, or an existing historical file
    /// cannot be read. Failures in the analysis stages and in persisting one
    /// granularity are reported on the returned summary instead.
    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let user = self.config.user.as_str();
        info!(%run_id, user, input = %self.config.input_file.display(), "Starting workflow analysis");

        let paths = PathsMap::prepare(&self.config.base_dir, user, &self.config.input_file)?;
        let mut tracker = StageTracker::default();

        info!(stage = Stage::Ingest.number(), "Initialising {} step...", Stage::Ingest);
        let started = Instant::now();
        let records = match (self.adapters.ingest)(&paths.input_file) {
            Ok(records) => records,
            Err(e) => {
                error!(
                    path = %paths.input_file.display(),
                    error = %e,
                    "{} step unsuccessful",
                    Stage::Ingest
                );
                return Err(e.into());
            }
        };
        tracker.record(Stage::Ingest, StageStatus::Completed, started, None);
        info!(
            tasks = records.tasks.n_rows(),
            task_columns = records.tasks.n_columns(),
            workflow_columns = records.workflow.n_columns(),
            "{} step successful",
            Stage::Ingest
        );

        let store = HistoricalStore::new(&paths.hist_dir);
        debug!(
            tasks = %paths.historical_file(Granularity::Task).display(),
            workflow = %paths.historical_file(Granularity::Workflow).display(),
            "Loading historical data"
        );
        let history = store.load_both()?;

        let (analysis, analysis_error) = match history.both() {
            Some((hist_tasks, hist_workflow)) => {
                match self.analyse(run_id, &paths, &records, hist_tasks, hist_workflow, &mut tracker) {
                    Ok(report_path) => {
                        info!(report = %report_path.display(), "Workflow analysis finished");
                        (AnalysisOutcome::Completed { report_path }, None)
                    }
                    Err(e) => {
                        tracker.skip_remaining(&Stage::ANALYSIS);
                        (
                            AnalysisOutcome::Failed {
                                stage: e.stage(),
                                message: e.to_string(),
                            },
                            Some(e),
                        )
                    }
                }
            }
            None => {
                info!("No historical data available");
                if !self.config.task.features.is_all() || !self.config.workflow.features.is_all() {
                    info!("Requested features were not checked against the input data");
                }
                tracker.skip_remaining(&Stage::ANALYSIS);
                (AnalysisOutcome::NoHistory, None)
            }
        };

        let persisted = self.persist(&store, &history, &records, &mut tracker);

        Ok(RunSummary {
            run_id,
            user: user.to_string(),
            stages: tracker.records,
            analysis,
            persisted,
            analysis_error,
        })
    }

    fn analyse(
        &self,
        run_id: Uuid,
        paths: &PathsMap,
        records: &RunRecords,
        hist_tasks: &Dataset,
        hist_workflow: &Dataset,
        tracker: &mut StageTracker,
    ) -> Result<PathBuf, AnalysisError> {
        let task_sel = &self.config.task;
        let workflow_sel = &self.config.workflow;
        let settings = &self.config.model;

        let (task_views, workflow_views) = tracker.run(Stage::Reconcile, || {
            let tasks = reconcile(
                Granularity::Task,
                &task_sel.features,
                &task_sel.labels,
                &records.tasks,
                Some(hist_tasks),
            )?;
            let workflow = reconcile(
                Granularity::Workflow,
                &workflow_sel.features,
                &workflow_sel.labels,
                &records.workflow,
                Some(hist_workflow),
            )?;
            Ok::<_, ColumnMismatchError>((tasks, workflow))
        })?;
        let task_hist = task_views.historical.as_ref().unwrap_or(hist_tasks);
        let workflow_hist = workflow_views.historical.as_ref().unwrap_or(hist_workflow);

        let (task_predictions, workflow_predictions) = tracker.run(Stage::Model, || {
            let tasks = (self.adapters.model)(task_hist, &task_views.current, &task_sel.labels, settings)?;
            let workflow = (self.adapters.model)(
                workflow_hist,
                &workflow_views.current,
                &workflow_sel.labels,
                settings,
            )?;
            Ok::<_, ModelError>((tasks, workflow))
        })?;

        let (task_results, workflow_results) = tracker.run(Stage::ProcessResults, || {
            let tasks = (self.adapters.process)(&task_predictions, &task_views.current, settings)?;
            let workflow =
                (self.adapters.process)(&workflow_predictions, &workflow_views.current, settings)?;
            Ok::<_, ProcessError>((tasks, workflow))
        })?;

        let stats = tracker.run(Stage::StructuralAnalysis, || {
            (self.adapters.structure)(
                task_hist,
                &records.tasks,
                &task_results.important_features,
                &task_sel.labels,
            )
        })?;

        tracker.run(Stage::Report, || {
            (self.adapters.report)(&ReportInputs {
                run_id,
                user: &self.config.user,
                task_features: &task_results.important_features,
                workflow_features: &workflow_results.important_features,
                enriched_tasks: &task_results.enriched,
                enriched_workflow: &workflow_results.enriched,
                stats: &stats,
                paths,
            })
        })
    }

    /// Appends the unfiltered run records to each granularity's history.
    fn persist(
        &self,
        store: &HistoricalStore,
        history: &HistoryPair,
        records: &RunRecords,
        tracker: &mut StageTracker,
    ) -> Vec<PersistOutcome> {
        info!(
            stage = Stage::Persist.number(),
            "Saving new workflow execution data to historical data..."
        );
        let started = Instant::now();

        let outcomes: Vec<PersistOutcome> = Granularity::ALL
            .iter()
            .map(|&granularity| {
                match store.merge_and_persist(granularity, history.get(granularity), records.get(granularity)) {
                    Ok(saved) => {
                        info!(
                            %granularity,
                            path = %saved.path.display(),
                            rows = saved.rows,
                            columns = saved.columns,
                            "Historical data updated"
                        );
                        PersistOutcome::Saved {
                            granularity,
                            path: saved.path,
                            rows: saved.rows,
                            columns: saved.columns,
                        }
                    }
                    Err(e) => {
                        warn!(
                            %granularity,
                            path = %e.path.display(),
                            error = %e,
                            "Encountered error while trying to save new data to historical data"
                        );
                        PersistOutcome::Failed {
                            granularity,
                            path: e.path.clone(),
                            message: e.source.to_string(),
                        }
                    }
                }
            })
            .collect();

        let failures: Vec<String> = outcomes
            .iter()
            .filter(|outcome| !outcome.is_saved())
            .map(|outcome| outcome.granularity().to_string())
            .collect();
        if failures.is_empty() {
            tracker.record(Stage::Persist, StageStatus::Completed, started, None);
        } else {
            tracker.record(
                Stage::Persist,
                StageStatus::Failed,
                started,
                Some(format!("failed to save {} history", failures.join(", "))),
            );
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::analysis::{Predictions, StructuralStats};
    use crate::dataset::{read_csv, Value};
    use crate::pipeline::config::{FeatureSelection, LabelMap, ModelSettings};
    use tempfile::TempDir;

    fn ingest_one_task(_: &Path) -> Result<RunRecords, IngestError> {
        Ok(RunRecords {
            tasks: Dataset::from_rows(
                ["taskId", "duration"],
                vec![vec![1.into(), 5.0.into()]],
            )
            .unwrap(),
            workflow: Dataset::from_rows(["nodeCount"], vec![vec![1.into()]]).unwrap(),
        })
    }

    fn ingest_fails(path: &Path) -> Result<RunRecords, IngestError> {
        Err(IngestError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        })
    }

    fn model_fails(
        _: &Dataset,
        _: &Dataset,
        _: &LabelMap,
        _: &ModelSettings,
    ) -> Result<Predictions, ModelError> {
        Err(ModelError::InsufficientData("no rows".to_string()))
    }

    fn empty_structure(
        _: &Dataset,
        _: &Dataset,
        _: &[String],
        _: &LabelMap,
    ) -> Result<StructuralStats, StructureError> {
        Ok(StructuralStats::default())
    }

    fn pipeline(base: &TempDir, adapters: StageAdapters) -> AnalysisPipeline {
        let config = AnalysisConfig::new(base.path(), "alice", "run.json");
        AnalysisPipeline::with_adapters(config, adapters).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AnalysisConfig::new("/tmp", "", "run.json");
        assert!(matches!(
            AnalysisPipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_first_run_skips_analysis_and_seeds_history() {
        let base = TempDir::new().unwrap();
        let adapters = StageAdapters::default().with_ingest(ingest_one_task);

        let summary = pipeline(&base, adapters).run().unwrap();

        assert_eq!(summary.analysis, AnalysisOutcome::NoHistory);
        assert_eq!(summary.stage_status(Stage::Ingest), Some(StageStatus::Completed));
        for stage in Stage::ANALYSIS {
            assert_eq!(summary.stage_status(stage), Some(StageStatus::Skipped));
        }
        assert_eq!(summary.stage_status(Stage::Persist), Some(StageStatus::Completed));
        assert!(summary.persisted_all());

        let hist = base.path().join("files/alice/csvs/tasks_historical_data.csv");
        let stored = read_csv(&hist).unwrap();
        assert_eq!(stored.n_rows(), 1);
        assert_eq!(stored.get(0, "duration"), Some(&Value::Float(5.0)));
    }

    #[test]
    fn test_model_failure_still_persists() {
        let base = TempDir::new().unwrap();
        let adapters = StageAdapters::default().with_ingest(ingest_one_task);
        pipeline(&base, adapters).run().unwrap();

        let adapters = adapters.with_model(model_fails);
        let summary = pipeline(&base, adapters).run().unwrap();

        assert!(matches!(
            summary.analysis,
            AnalysisOutcome::Failed { stage: Stage::Model, .. }
        ));
        assert!(matches!(summary.analysis_error, Some(AnalysisError::Model(_))));
        assert_eq!(summary.stage_status(Stage::Reconcile), Some(StageStatus::Completed));
        assert_eq!(summary.stage_status(Stage::Model), Some(StageStatus::Failed));
        assert_eq!(summary.stage_status(Stage::Report), Some(StageStatus::Skipped));
        assert!(summary.persisted_all());

        let hist = base.path().join("files/alice/csvs/tasks_historical_data.csv");
        assert_eq!(read_csv(&hist).unwrap().n_rows(), 2);
    }

    #[test]
    fn test_column_mismatch_persists_unfiltered_run() {
        let base = TempDir::new().unwrap();
        let adapters = StageAdapters::default().with_ingest(ingest_one_task);
        pipeline(&base, adapters).run().unwrap();

        let config = AnalysisConfig::new(base.path(), "alice", "run.json")
            .with_task_features(FeatureSelection::of(["cpu"]));
        let summary = AnalysisPipeline::with_adapters(config, adapters)
            .unwrap()
            .run()
            .unwrap();

        match &summary.analysis_error {
            Some(AnalysisError::Reconcile(e)) => assert_eq!(e.missing, vec!["cpu".to_string()]),
            other => panic!("unexpected analysis error: {:?}", other),
        }
        let hist = base.path().join("files/alice/csvs/tasks_historical_data.csv");
        let stored = read_csv(&hist).unwrap();
        assert_eq!(stored.n_rows(), 2);
        assert!(stored.has_column("taskId"));
        assert!(stored.has_column("duration"));
    }

    #[test]
    fn test_ingest_failure_persists_nothing() {
        let base = TempDir::new().unwrap();
        let adapters = StageAdapters::default().with_ingest(ingest_fails);

        let err = pipeline(&base, adapters).run().unwrap_err();

        assert!(matches!(err, PipelineError::Ingest(_)));
        assert!(!base
            .path()
            .join("files/alice/csvs/tasks_historical_data.csv")
            .exists());
    }

    #[test]
    fn test_completed_analysis_records_report() {
        let base = TempDir::new().unwrap();
        let adapters = StageAdapters::default()
            .with_ingest(ingest_one_task)
            .with_structure(empty_structure);
        pipeline(&base, adapters).run().unwrap();

        let summary = pipeline(&base, adapters).run().unwrap();

        let report = summary.report_path().unwrap();
        assert!(report.is_file());
        assert!(summary
            .stages
            .iter()
            .all(|record| record.status == StageStatus::Completed));
        assert!(summary.analysis_error.is_none());
    }

    #[test]
    fn test_summary_serializes_outcomes() {
        let base = TempDir::new().unwrap();
        let adapters = StageAdapters::default().with_ingest(ingest_one_task);
        let summary = pipeline(&base, adapters).run().unwrap();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["user"], "alice");
        assert_eq!(json["analysis"]["status"], "no_history");
        assert_eq!(json["persisted"][0]["status"], "saved");
        assert_eq!(json["stages"][1]["status"], "skipped");
        assert!(json.get("analysis_error").is_none());
    }
}
