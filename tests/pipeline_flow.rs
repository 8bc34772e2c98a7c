//! End-to-end tests for the analysis pipeline.
//!
//! Each test works in its own temporary base directory; stage adapters are
//! swapped where a test needs a specific run record or a failing stage.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use workflow_analysis::analysis::{Predictions, ProcessedResults, StructuralStats};
use workflow_analysis::dataset::{read_csv, write_csv, Dataset, Granularity, Value};
use workflow_analysis::error::{IngestError, ModelError, ProcessError, ReportError, StructureError};
use workflow_analysis::ingest::{parse_summary, RunRecords};
use workflow_analysis::pipeline::{
    AnalysisConfig, AnalysisError, AnalysisOutcome, AnalysisPipeline, FeatureSelection, LabelMap,
    ModelSettings, PersistOutcome, PipelineError, Stage, StageAdapters, StageStatus,
};
use workflow_analysis::report::ReportInputs;

fn tasks_history(base: &Path, user: &str) -> std::path::PathBuf {
    base.join("files")
        .join(user)
        .join("csvs")
        .join("tasks_historical_data.csv")
}

fn workflow_history(base: &Path, user: &str) -> std::path::PathBuf {
    base.join("files")
        .join(user)
        .join("csvs")
        .join("workflow_historical_data.csv")
}

fn workflow_row() -> Dataset {
    Dataset::from_rows(["name", "nodeCount"], vec![vec!["etl".into(), 1.into()]]).unwrap()
}

fn first_run(_: &Path) -> Result<RunRecords, IngestError> {
    Ok(RunRecords {
        tasks: Dataset::from_rows(["taskId", "duration"], vec![vec![1.into(), 5.0.into()]])
            .unwrap(),
        workflow: workflow_row(),
    })
}

fn second_run(_: &Path) -> Result<RunRecords, IngestError> {
    Ok(RunRecords {
        tasks: Dataset::from_rows(
            ["taskId", "duration", "retries"],
            vec![vec![2.into(), 7.0.into(), 1.into()]],
        )
        .unwrap(),
        workflow: workflow_row(),
    })
}

fn unreadable_input(path: &Path) -> Result<RunRecords, IngestError> {
    Err(IngestError::Read {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated upload"),
    })
}

fn failing_model(
    _: &Dataset,
    _: &Dataset,
    _: &LabelMap,
    _: &ModelSettings,
) -> Result<Predictions, ModelError> {
    Err(ModelError::InsufficientData("model unavailable".to_string()))
}

fn no_nodes(_: &Path) -> Result<RunRecords, IngestError> {
    parse_summary(r#"{"workflow": {"name": "etl", "nodes": []}}"#)
}

fn one_node(_: &Path) -> Result<RunRecords, IngestError> {
    parse_summary(r#"{"workflow": {"name": "etl", "nodes": [{"id": "0:1", "duration": 3.0}]}}"#)
}

fn failing_process(
    _: &Predictions,
    current: &Dataset,
    _: &ModelSettings,
) -> Result<ProcessedResults, ProcessError> {
    Err(ProcessError::RowCountMismatch {
        label: "duration".to_string(),
        expected: current.n_rows(),
        actual: 0,
    })
}

fn failing_structure(
    _: &Dataset,
    _: &Dataset,
    _: &[String],
    _: &LabelMap,
) -> Result<StructuralStats, StructureError> {
    Err(StructureError::MissingKeyColumn(vec!["name".to_string()]))
}

fn failing_report(_: &ReportInputs<'_>) -> Result<PathBuf, ReportError> {
    Err(ReportError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "read-only report directory",
    )))
}

/// Fails unless the historical data it receives is narrowed to the selection.
fn structure_expects_selected_history(
    historical: &Dataset,
    _: &Dataset,
    _: &[String],
    _: &LabelMap,
) -> Result<StructuralStats, StructureError> {
    if historical.has_column("taskId") {
        return Err(StructureError::MissingKeyColumn(vec!["taskId".to_string()]));
    }
    Ok(StructuralStats::default())
}

fn run(base: &TempDir, adapters: StageAdapters) -> workflow_analysis::RunSummary {
    let config = AnalysisConfig::new(base.path(), "alice", "run.json");
    AnalysisPipeline::with_adapters(config, adapters)
        .unwrap()
        .run()
        .unwrap()
}

#[test]
fn test_alice_first_run_bootstraps_history() {
    let base = TempDir::new().unwrap();
    let summary = run(&base, StageAdapters::default().with_ingest(first_run));

    assert_eq!(summary.analysis, AnalysisOutcome::NoHistory);
    for stage in [
        Stage::Model,
        Stage::ProcessResults,
        Stage::StructuralAnalysis,
        Stage::Report,
    ] {
        assert_eq!(summary.stage_status(stage), Some(StageStatus::Skipped));
    }

    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert_eq!(tasks.columns(), &["taskId".to_string(), "duration".to_string()]);
    assert_eq!(tasks.n_rows(), 1);
    assert_eq!(tasks.get(0, "taskId"), Some(&Value::Int(1)));
    assert_eq!(tasks.get(0, "duration"), Some(&Value::Float(5.0)));

    let workflow = read_csv(&workflow_history(base.path(), "alice")).unwrap();
    assert_eq!(workflow.n_rows(), 1);

    assert!(base.path().join("reports").join("alice").is_dir());
    assert!(base
        .path()
        .join("files/alice/report/figures")
        .is_dir());
}

#[test]
fn test_alice_second_run_grows_schema() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));
    run(&base, StageAdapters::default().with_ingest(second_run));

    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert_eq!(tasks.n_rows(), 2);
    assert_eq!(tasks.n_columns(), 3);
    assert_eq!(tasks.get(0, "retries"), Some(&Value::Missing));
    assert_eq!(tasks.get(1, "retries"), Some(&Value::Int(1)));
    assert_eq!(tasks.get(0, "duration"), Some(&Value::Float(5.0)));
    assert_eq!(tasks.get(1, "duration"), Some(&Value::Float(7.0)));
}

#[test]
fn test_same_run_twice_is_appended_twice() {
    let base = TempDir::new().unwrap();
    let adapters = StageAdapters::default().with_ingest(first_run);
    run(&base, adapters);
    run(&base, adapters);

    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert_eq!(tasks.n_rows(), 2);
    assert_eq!(tasks.rows()[0], tasks.rows()[1]);
}

#[test]
fn test_model_failure_still_persists_run() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let summary = run(
        &base,
        StageAdapters::default()
            .with_ingest(second_run)
            .with_model(failing_model),
    );

    assert!(matches!(summary.analysis_error, Some(AnalysisError::Model(_))));
    assert_eq!(summary.stage_status(Stage::Model), Some(StageStatus::Failed));
    assert_eq!(
        summary.stage_status(Stage::ProcessResults),
        Some(StageStatus::Skipped)
    );
    assert!(summary.persisted_all());

    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert_eq!(tasks.n_rows(), 2);
}

#[test]
fn test_column_mismatch_persists_unfiltered_records() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let config = AnalysisConfig::new(base.path(), "alice", "run.json")
        .with_task_features(FeatureSelection::of(["cpuTime"]));
    let summary = AnalysisPipeline::with_adapters(
        config,
        StageAdapters::default().with_ingest(second_run),
    )
    .unwrap()
    .run()
    .unwrap();

    match summary.analysis {
        AnalysisOutcome::Failed { stage, ref message } => {
            assert_eq!(stage, Stage::Reconcile);
            assert!(message.contains("cpuTime"));
        }
        ref other => panic!("unexpected outcome: {:?}", other),
    }

    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert_eq!(tasks.n_rows(), 2);
    assert!(tasks.has_column("retries"));
}

#[test]
fn test_ingest_failure_persists_nothing() {
    let base = TempDir::new().unwrap();
    let config = AnalysisConfig::new(base.path(), "alice", "run.json");
    let err = AnalysisPipeline::with_adapters(
        config,
        StageAdapters::default().with_ingest(unreadable_input),
    )
    .unwrap()
    .run()
    .unwrap_err();

    assert!(matches!(err, PipelineError::Ingest(_)));
    assert!(!tasks_history(base.path(), "alice").exists());
    assert!(!workflow_history(base.path(), "alice").exists());
}

#[test]
fn test_unreadable_history_aborts_before_writing() {
    let base = TempDir::new().unwrap();
    let path = tasks_history(base.path(), "alice");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "taskId,duration\n1,5.0,extra\n").unwrap();

    let config = AnalysisConfig::new(base.path(), "alice", "run.json");
    let err = AnalysisPipeline::with_adapters(
        config,
        StageAdapters::default().with_ingest(first_run),
    )
    .unwrap()
    .run()
    .unwrap_err();

    assert!(matches!(err, PipelineError::History(_)));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "taskId,duration\n1,5.0,extra\n"
    );
    assert!(!workflow_history(base.path(), "alice").exists());
}

#[test]
fn test_single_history_file_is_merged_not_replaced() {
    let base = TempDir::new().unwrap();
    let path = tasks_history(base.path(), "alice");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let existing = Dataset::from_rows(
        ["taskId", "duration"],
        vec![vec![0.into(), 3.0.into()], vec![0.into(), 4.0.into()]],
    )
    .unwrap();
    write_csv(&existing, &path).unwrap();

    let summary = run(&base, StageAdapters::default().with_ingest(first_run));

    assert_eq!(summary.analysis, AnalysisOutcome::NoHistory);
    let tasks = read_csv(&path).unwrap();
    assert_eq!(tasks.n_rows(), 3);
    assert_eq!(tasks.get(0, "duration"), Some(&Value::Float(3.0)));
    assert_eq!(tasks.get(2, "duration"), Some(&Value::Float(5.0)));
    assert_eq!(
        read_csv(&workflow_history(base.path(), "alice"))
            .unwrap()
            .n_rows(),
        1
    );
}

#[test]
fn test_users_do_not_share_history() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let config = AnalysisConfig::new(base.path(), "bob", "run.json");
    let summary = AnalysisPipeline::with_adapters(
        config,
        StageAdapters::default().with_ingest(first_run),
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(summary.analysis, AnalysisOutcome::NoHistory);
    assert_eq!(
        read_csv(&tasks_history(base.path(), "alice")).unwrap().n_rows(),
        1
    );
    assert_eq!(
        read_csv(&tasks_history(base.path(), "bob")).unwrap().n_rows(),
        1
    );
}

#[test]
fn test_run_without_nodes_leaves_no_phantom_column() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(no_nodes));

    let path = tasks_history(base.path(), "alice");
    assert_eq!(fs::read_to_string(&path).unwrap(), "");

    run(&base, StageAdapters::default().with_ingest(one_node));

    let tasks = read_csv(&path).unwrap();
    assert_eq!(tasks.columns(), &["duration".to_string(), "id".to_string()]);
    assert_eq!(tasks.n_rows(), 1);
    assert_eq!(tasks.get(0, "id"), Some(&Value::from("0:1")));
}

#[test]
fn test_persist_failure_is_recorded_and_other_granularity_saved() {
    let base = TempDir::new().unwrap();
    let blocked = tasks_history(base.path(), "alice");
    fs::create_dir_all(&blocked).unwrap();

    let summary = run(&base, StageAdapters::default().with_ingest(first_run));

    assert_eq!(summary.stage_status(Stage::Persist), Some(StageStatus::Failed));
    assert!(!summary.persisted_all());
    match &summary.persisted[0] {
        PersistOutcome::Failed {
            granularity, path, ..
        } => {
            assert_eq!(*granularity, Granularity::Task);
            assert_eq!(path, &blocked);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(summary.persisted[1].is_saved());
    assert_eq!(
        read_csv(&workflow_history(base.path(), "alice"))
            .unwrap()
            .n_rows(),
        1
    );
}

fn assert_failed_at(summary: &workflow_analysis::RunSummary, failed: Stage) {
    assert_eq!(summary.stage_status(failed), Some(StageStatus::Failed));
    let later = Stage::ANALYSIS
        .iter()
        .skip_while(|stage| **stage != failed)
        .skip(1);
    for stage in later {
        assert_eq!(summary.stage_status(*stage), Some(StageStatus::Skipped));
    }
    assert!(matches!(
        summary.analysis,
        AnalysisOutcome::Failed { stage, .. } if stage == failed
    ));
    assert_eq!(summary.stage_status(Stage::Persist), Some(StageStatus::Completed));
    assert!(summary.persisted_all());
}

#[test]
fn test_process_failure_skips_later_stages_and_persists() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let summary = run(
        &base,
        StageAdapters::default()
            .with_ingest(second_run)
            .with_process(failing_process),
    );

    assert_failed_at(&summary, Stage::ProcessResults);
    assert!(matches!(summary.analysis_error, Some(AnalysisError::Process(_))));
    assert_eq!(
        read_csv(&tasks_history(base.path(), "alice")).unwrap().n_rows(),
        2
    );
}

#[test]
fn test_structure_failure_skips_report_and_persists() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let summary = run(
        &base,
        StageAdapters::default()
            .with_ingest(second_run)
            .with_structure(failing_structure),
    );

    assert_failed_at(&summary, Stage::StructuralAnalysis);
    assert!(matches!(summary.analysis_error, Some(AnalysisError::Structure(_))));
}

#[test]
fn test_report_failure_still_persists() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let summary = run(
        &base,
        StageAdapters::default()
            .with_ingest(second_run)
            .with_report(failing_report),
    );

    assert_failed_at(&summary, Stage::Report);
    assert!(matches!(summary.analysis_error, Some(AnalysisError::Report(_))));
    assert_eq!(
        read_csv(&workflow_history(base.path(), "alice"))
            .unwrap()
            .n_rows(),
        2
    );
}

#[test]
fn test_structural_analysis_receives_selected_history() {
    let base = TempDir::new().unwrap();
    run(&base, StageAdapters::default().with_ingest(first_run));

    let config = AnalysisConfig::new(base.path(), "alice", "run.json")
        .with_task_features(FeatureSelection::of(["duration"]));
    let summary = AnalysisPipeline::with_adapters(
        config,
        StageAdapters::default()
            .with_ingest(second_run)
            .with_structure(structure_expects_selected_history),
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(
        summary.stage_status(Stage::StructuralAnalysis),
        Some(StageStatus::Completed)
    );
    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert!(tasks.has_column("taskId"));
    assert!(tasks.has_column("retries"));
}

#[test]
fn test_first_run_ignores_unchecked_feature_selection() {
    let base = TempDir::new().unwrap();
    let config = AnalysisConfig::new(base.path(), "alice", "run.json")
        .with_task_features(FeatureSelection::of(["cpuTime"]));
    let summary = AnalysisPipeline::with_adapters(
        config,
        StageAdapters::default().with_ingest(first_run),
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(summary.analysis, AnalysisOutcome::NoHistory);
    assert_eq!(summary.stage_status(Stage::Reconcile), Some(StageStatus::Skipped));
    assert!(summary.persisted_all());
    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert!(!tasks.has_column("cpuTime"));
}

const RUN_SUMMARY: &str = r#"{
    "workflowSummary": {
        "environment": { "os": "linux" },
        "workflow": {
            "name": "etl",
            "nodes": [
                { "id": "0:1", "name": "CSV Reader", "duration": 12.0, "memory": 100.0 },
                { "id": "0:2", "name": "Row Filter", "duration": 4.0, "memory": 40.0 },
                { "id": "0:3", "name": "Writer", "duration": 8.0, "memory": 60.0 }
            ]
        }
    }
}"#;

#[test]
fn test_full_run_with_built_in_stages_writes_report() {
    let base = TempDir::new().unwrap();
    fs::write(base.path().join("run.json"), RUN_SUMMARY).unwrap();

    let config = || {
        AnalysisConfig::new(base.path(), "alice", "run.json")
            .with_task_features(FeatureSelection::of(["name", "id", "memory"]))
            .with_task_labels(LabelMap::new().with_regressor(["duration"]))
            .with_model_settings(ModelSettings {
                neighbors: 2,
                top_features: 5,
            })
    };

    let first = AnalysisPipeline::new(config()).unwrap().run().unwrap();
    assert_eq!(first.analysis, AnalysisOutcome::NoHistory);

    let second = AnalysisPipeline::new(config()).unwrap().run().unwrap();
    assert!(
        second.analysis_error.is_none(),
        "analysis failed: {:?}",
        second.analysis_error
    );
    let report = second.report_path().unwrap();
    assert!(report.starts_with(base.path().join("reports").join("alice")));
    let content = fs::read_to_string(report).unwrap();
    assert!(content.contains("memory"));

    let figures = base.path().join("files/alice/report/figures");
    assert!(figures.join("task_stats.csv").is_file());
    assert!(figures.join("branch_stats.csv").is_file());

    for outcome in &second.persisted {
        assert!(outcome.is_saved(), "{:?}", outcome);
    }
    let tasks = read_csv(&tasks_history(base.path(), "alice")).unwrap();
    assert_eq!(tasks.n_rows(), 6);
    assert_eq!(
        second
            .persisted
            .iter()
            .map(|o| o.granularity())
            .collect::<Vec<_>>(),
        Granularity::ALL.to_vec()
    );
}
