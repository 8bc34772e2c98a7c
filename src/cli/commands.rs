//! CLI command definitions for the workflow analysis system.
//!
//! `was analyse` runs the full pipeline for one workflow summary and
//! `was history` inspects a user's historical datasets.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::pipeline::config::validate_user;
use crate::pipeline::{
    AnalysisConfig, AnalysisOutcome, AnalysisPipeline, FeatureSelection, LabelMap, PathsMap,
    PersistOutcome, RunSummary, SelectionFile,
};
use crate::storage::HistoricalStore;

/// Workflow analysis: predictive and structural feedback on workflow runs.
#[derive(Parser)]
#[command(name = "was")]
#[command(about = "Analyse workflow runs against their execution history")]
#[command(version)]
#[command(
    long_about = "was ingests a workflow summary, compares it with the user's historical runs and writes a feedback report.\n\nEvery run is appended to the user's historical data, even when analysis fails.\n\nExample usage:\n  was analyse -f uploads/run.json -u alice --tf executionStatistics.executionDurationSinceStart"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Analyse a workflow summary and append it to the user's history.
    #[command(alias = "analyze")]
    Analyse(AnalyseArgs),

    /// Show the user's historical datasets.
    History(HistoryArgs),
}

/// Arguments for `was analyse`.
#[derive(Parser, Debug)]
pub struct AnalyseArgs {
    /// Workflow summary JSON file, relative to the base directory.
    #[arg(short = 'f', long)]
    pub file: PathBuf,

    /// User whose history is analysed and updated.
    #[arg(short = 'u', long)]
    pub user: String,

    /// Task-level features to analyse (all columns when omitted).
    #[arg(long = "task-features", visible_alias = "tf", num_args = 1.., value_delimiter = ',')]
    pub task_features: Vec<String>,

    /// Workflow-level features to analyse (all columns when omitted).
    #[arg(long = "workflow-features", visible_alias = "wf", num_args = 1.., value_delimiter = ',')]
    pub workflow_features: Vec<String>,

    /// Task-level labels predicted with a classifier.
    #[arg(long = "task-classifier", visible_alias = "tc", num_args = 1.., value_delimiter = ',')]
    pub task_classifier: Vec<String>,

    /// Task-level labels predicted with a regressor.
    #[arg(long = "task-regressor", visible_alias = "tr", num_args = 1.., value_delimiter = ',')]
    pub task_regressor: Vec<String>,

    /// Workflow-level labels predicted with a classifier.
    #[arg(long = "workflow-classifier", visible_alias = "wc", num_args = 1.., value_delimiter = ',')]
    pub workflow_classifier: Vec<String>,

    /// Workflow-level labels predicted with a regressor.
    #[arg(long = "workflow-regressor", visible_alias = "wr", num_args = 1.., value_delimiter = ',')]
    pub workflow_regressor: Vec<String>,

    /// YAML selection file; its entries are added to the command-line lists.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base directory holding user files and reports.
    #[arg(long, env = "WAS_HOME", default_value = ".")]
    pub base_dir: PathBuf,

    /// Neighbours used per prediction (overrides WAS_NEIGHBORS).
    #[arg(long)]
    pub neighbors: Option<usize>,

    /// Number of important features kept (overrides WAS_TOP_FEATURES).
    #[arg(long)]
    pub top_features: Option<usize>,

    /// Output the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `was history`.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// User whose history is shown.
    #[arg(short = 'u', long)]
    pub user: String,

    /// Base directory holding user files and reports.
    #[arg(long, env = "WAS_HOME", default_value = ".")]
    pub base_dir: PathBuf,

    /// Output as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Analyse(args) => run_analyse_command(args),
        Commands::History(args) => run_history_command(args),
    }
}

impl AnalyseArgs {
    /// Builds the invocation configuration.
    ///
    /// Precedence for model settings: command-line flags, then environment
    /// variables, then defaults. Feature and label lists from `--config` are
    /// unioned with the command-line lists.
    pub fn to_config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = AnalysisConfig::new(&self.base_dir, &self.user, &self.file)
            .with_task_features(FeatureSelection::of(self.task_features.iter().cloned()))
            .with_workflow_features(FeatureSelection::of(self.workflow_features.iter().cloned()))
            .with_task_labels(
                LabelMap::new()
                    .with_classifier(self.task_classifier.iter().cloned())
                    .with_regressor(self.task_regressor.iter().cloned()),
            )
            .with_workflow_labels(
                LabelMap::new()
                    .with_classifier(self.workflow_classifier.iter().cloned())
                    .with_regressor(self.workflow_regressor.iter().cloned()),
            );

        if let Some(path) = &self.config {
            let selection = SelectionFile::load(path)
                .with_context(|| format!("Failed to load selection file {}", path.display()))?;
            config.merge_selection_file(selection);
        }

        let mut config = config.apply_env()?;
        if let Some(neighbors) = self.neighbors {
            config.model.neighbors = neighbors;
        }
        if let Some(top_features) = self.top_features {
            config.model.top_features = top_features;
        }

        config.validate()?;
        Ok(config)
    }
}

fn run_analyse_command(args: AnalyseArgs) -> anyhow::Result<()> {
    let config = args.to_config()?;
    let pipeline = AnalysisPipeline::new(config)?;
    let summary = pipeline.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run {} for user {}", summary.run_id, summary.user);
    for record in &summary.stages {
        let status = format!("{:?}", record.status).to_lowercase();
        match &record.error {
            Some(err) => println!(
                "  {}. {:<24} {:<9} {}",
                record.stage.number(),
                record.stage.to_string(),
                status,
                err
            ),
            None => println!(
                "  {}. {:<24} {:<9} {}ms",
                record.stage.number(),
                record.stage.to_string(),
                status,
                record.elapsed_ms
            ),
        }
    }

    match &summary.analysis {
        AnalysisOutcome::Completed { report_path } => {
            println!("Report: {}", report_path.display());
        }
        AnalysisOutcome::NoHistory => {
            println!("No historical data available; this run starts the history.");
        }
        AnalysisOutcome::Failed { stage, message } => {
            warn!(%stage, "Analysis did not complete");
            println!("Analysis failed at {}: {}", stage, message);
        }
    }

    for outcome in &summary.persisted {
        match outcome {
            PersistOutcome::Saved {
                granularity,
                path,
                rows,
                columns,
            } => println!(
                "Saved {} history to {} ({} rows, {} columns)",
                granularity,
                path.display(),
                rows,
                columns
            ),
            PersistOutcome::Failed {
                granularity,
                path,
                message,
            } => println!(
                "Failed to save {} history to {}: {}",
                granularity,
                path.display(),
                message
            ),
        }
    }
}

fn run_history_command(args: HistoryArgs) -> anyhow::Result<()> {
    validate_user(&args.user)?;
    let paths = PathsMap::resolve(&args.base_dir, &args.user, &PathBuf::new());
    let store = HistoricalStore::new(&paths.hist_dir);
    info!(user = %args.user, dir = %store.dir().display(), "Reading historical data");

    let summary = store.summary()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Historical data for {}", args.user);
    for entry in &summary {
        if entry.exists {
            println!(
                "  {}: {} rows, {} columns ({})",
                entry.granularity,
                entry.rows,
                entry.columns.len(),
                entry.path.display()
            );
            println!("    {}", entry.columns.join(", "));
        } else {
            println!("  {}: none ({})", entry.granularity, entry.path.display());
        }
    }
    Ok(())
}
