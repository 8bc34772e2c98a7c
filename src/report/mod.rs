//! Feedback report generation.
//!
//! Writes figure data series into the user's figures directory and renders a
//! Markdown report into the report directory.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tera::{Context, Tera};
use uuid::Uuid;

use crate::analysis::{BranchStat, StructuralStats, TaskStat};
use crate::dataset::{write_csv, Dataset, Value};
use crate::error::ReportError;
use crate::pipeline::paths::PathsMap;

const REPORT_TEMPLATE: &str = r#"# Workflow Analysis Report

- User: {{ user }}
- Run: {{ run_id }}
- Generated: {{ generated_at }}

## Task level

Tasks in this run: {{ task_rows }}

{% if task_features | length > 0 -%}
Most important features:
{% for feature in task_features %}
{{ loop.index }}. {{ feature }}
{%- endfor %}
{% else -%}
No important task features were identified.
{%- endif %}

{% if task_predictions | length > 0 -%}
Prediction columns: {{ task_predictions | join(sep=", ") }}
{%- endif %}

## Workflow level

Workflow rows in this run: {{ workflow_rows }}

{% if workflow_features | length > 0 -%}
Most important features:
{% for feature in workflow_features %}
{{ loop.index }}. {{ feature }}
{%- endfor %}
{% else -%}
No important workflow features were identified.
{%- endif %}

{% if workflow_predictions | length > 0 -%}
Prediction columns: {{ workflow_predictions | join(sep=", ") }}
{%- endif %}

## Tasks compared with history

{% if task_stats | length > 0 -%}
| Task | Feature | History rows | Historical mean | Historical std | Current | z-score |
|---|---|---|---|---|---|---|
{% for row in task_stats -%}
| {{ row | join(sep=" | ") }} |
{% endfor -%}
{% else -%}
No task statistics available.
{%- endif %}

## Branches compared with history

{% if branch_stats | length > 0 -%}
| Branch | Feature | Tasks | Historical mean | Current |
|---|---|---|---|---|
{% for row in branch_stats -%}
| {{ row | join(sep=" | ") }} |
{% endfor -%}
{% else -%}
No branch statistics available.
{%- endif %}
"#;

/// Everything the report stage consumes.
#[derive(Debug, Clone, Copy)]
pub struct ReportInputs<'a> {
    pub run_id: Uuid,
    pub user: &'a str,
    pub task_features: &'a [String],
    pub workflow_features: &'a [String],
    pub enriched_tasks: &'a Dataset,
    pub enriched_workflow: &'a Dataset,
    pub stats: &'a StructuralStats,
    pub paths: &'a PathsMap,
}

#[derive(Serialize)]
struct FeatureFigure<'a> {
    granularity: &'a str,
    features: &'a [String],
}

/// Writes figure data and the Markdown report; returns the report path.
pub fn produce_report(inputs: &ReportInputs<'_>) -> Result<PathBuf, ReportError> {
    write_figures(inputs)?;

    let now = Utc::now();
    let mut context = Context::new();
    context.insert("user", inputs.user);
    context.insert("run_id", &inputs.run_id.to_string());
    context.insert("generated_at", &now.to_rfc3339());
    context.insert("task_rows", &inputs.enriched_tasks.n_rows());
    context.insert("workflow_rows", &inputs.enriched_workflow.n_rows());
    context.insert("task_features", inputs.task_features);
    context.insert("workflow_features", inputs.workflow_features);
    context.insert(
        "task_predictions",
        &prediction_columns(inputs.enriched_tasks),
    );
    context.insert(
        "workflow_predictions",
        &prediction_columns(inputs.enriched_workflow),
    );
    context.insert(
        "task_stats",
        &inputs
            .stats
            .task_stats
            .iter()
            .map(task_stat_cells)
            .collect::<Vec<_>>(),
    );
    context.insert(
        "branch_stats",
        &inputs
            .stats
            .branch_stats
            .iter()
            .map(branch_stat_cells)
            .collect::<Vec<_>>(),
    );

    let rendered = Tera::one_off(REPORT_TEMPLATE, &context, false)?;

    let short_id = inputs
        .run_id
        .to_string()
        .split('-')
        .next()
        .unwrap_or("0")
        .to_string();
    let report_path = inputs.paths.output_dir.join(format!(
        "report_{}_{}.md",
        now.format("%Y%m%d_%H%M%S"),
        short_id
    ));
    fs::write(&report_path, rendered)?;

    Ok(report_path)
}

fn write_figures(inputs: &ReportInputs<'_>) -> Result<(), ReportError> {
    let figures = &inputs.paths.figures_dir;

    for (granularity, features) in [
        ("task", inputs.task_features),
        ("workflow", inputs.workflow_features),
    ] {
        let figure = FeatureFigure {
            granularity,
            features,
        };
        fs::write(
            figures.join(format!("{}_important_features.json", granularity)),
            serde_json::to_vec_pretty(&figure)?,
        )?;
    }

    let task_table = Dataset::from_records(inputs.stats.task_stats.iter().map(|s| {
        vec![
            ("task".to_string(), Value::from(s.task.as_str())),
            ("feature".to_string(), Value::from(s.feature.as_str())),
            (
                "historical_count".to_string(),
                Value::Int(s.historical_count as i64),
            ),
            ("historical_mean".to_string(), Value::from(s.historical_mean)),
            ("historical_std".to_string(), Value::from(s.historical_std)),
            ("current_mean".to_string(), Value::from(s.current_mean)),
            ("z_score".to_string(), Value::from(s.z_score)),
        ]
    }));
    write_csv(&task_table, &figures.join("task_stats.csv"))?;

    let branch_table = Dataset::from_records(inputs.stats.branch_stats.iter().map(|s| {
        vec![
            ("branch".to_string(), Value::from(s.branch.as_str())),
            ("feature".to_string(), Value::from(s.feature.as_str())),
            ("task_count".to_string(), Value::Int(s.task_count as i64)),
            ("historical_mean".to_string(), Value::from(s.historical_mean)),
            ("current_mean".to_string(), Value::from(s.current_mean)),
        ]
    }));
    write_csv(&branch_table, &figures.join("branch_stats.csv"))?;

    Ok(())
}

fn prediction_columns(dataset: &Dataset) -> Vec<String> {
    dataset
        .columns()
        .iter()
        .filter(|c| c.starts_with("predicted_"))
        .cloned()
        .collect()
}

fn format_number(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

fn task_stat_cells(stat: &TaskStat) -> Vec<String> {
    vec![
        stat.task.clone(),
        stat.feature.clone(),
        stat.historical_count.to_string(),
        format_number(stat.historical_mean),
        format_number(stat.historical_std),
        format_number(stat.current_mean),
        format_number(stat.z_score),
    ]
}

fn branch_stat_cells(stat: &BranchStat) -> Vec<String> {
    vec![
        stat.branch.clone(),
        stat.feature.clone(),
        stat.task_count.to_string(),
        format_number(stat.historical_mean),
        format_number(stat.current_mean),
    ]
}
