//! Structural statistics over tasks and branches.
//!
//! Tasks are grouped by their key column and branches by the scope prefix of
//! the node id (`0:4:2` belongs to branch `0:4`). For every numeric
//! important feature the current run is compared with the history of the
//! same task or branch.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::{Dataset, Value};
use crate::error::StructureError;
use crate::pipeline::config::LabelMap;

/// Candidate task key columns, most specific first.
pub const TASK_KEY_COLUMNS: [&str; 3] = ["name", "taskId", "id"];

/// Column holding hierarchical node ids.
pub const NODE_ID_COLUMN: &str = "id";

/// Branch assigned to rows without a scoped node id.
pub const ROOT_BRANCH: &str = "root";

/// Per-task comparison of one feature against its history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStat {
    pub task: String,
    pub feature: String,
    pub historical_count: usize,
    pub historical_mean: Option<f64>,
    pub historical_std: Option<f64>,
    pub current_mean: Option<f64>,
    pub z_score: Option<f64>,
}

/// Per-branch comparison of one feature against its history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchStat {
    pub branch: String,
    pub feature: String,
    pub task_count: usize,
    pub historical_mean: Option<f64>,
    pub current_mean: Option<f64>,
}

/// Output of the structural analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructuralStats {
    pub branch_stats: Vec<BranchStat>,
    pub task_stats: Vec<TaskStat>,
}

/// Compares the current task data with its history.
///
/// Features analysed are the important features followed by the regressor
/// labels, restricted to columns that hold numbers.
///
/// # Errors
///
/// Returns `StructureError::MissingKeyColumn` if the current data has none of
/// [`TASK_KEY_COLUMNS`].
pub fn analyse(
    historical: &Dataset,
    current: &Dataset,
    important_features: &[String],
    labels: &LabelMap,
) -> Result<StructuralStats, StructureError> {
    let key_column = TASK_KEY_COLUMNS
        .iter()
        .copied()
        .find(|name| current.has_column(name))
        .ok_or_else(|| {
            StructureError::MissingKeyColumn(
                TASK_KEY_COLUMNS.iter().map(|s| s.to_string()).collect(),
            )
        })?;

    let mut features: Vec<&str> = Vec::new();
    for name in important_features.iter().chain(labels.regressor.iter()) {
        if features.contains(&name.as_str()) {
            continue;
        }
        if current.is_numeric_column(name) || historical.is_numeric_column(name) {
            features.push(name);
        }
    }

    let current_keys = row_keys(current, key_column);
    let historical_keys = row_keys(historical, key_column);
    let current_branches = row_branches(current);
    let historical_branches = row_branches(historical);

    let mut stats = StructuralStats::default();
    for feature in features {
        let cur = numeric_or_missing(current, feature);
        let hist = numeric_or_missing(historical, feature);

        let cur_by_task = group(&current_keys, &cur);
        let hist_by_task = group(&historical_keys, &hist);
        for (task, values) in &cur_by_task {
            let history = hist_by_task.get(task).map(Vec::as_slice).unwrap_or(&[]);
            let historical_mean = mean(history);
            let historical_std = sample_std(history);
            let current_mean = mean(values);
            let z_score = match (current_mean, historical_mean, historical_std) {
                (Some(c), Some(m), Some(s)) if s > 0.0 => Some((c - m) / s),
                _ => None,
            };
            stats.task_stats.push(TaskStat {
                task: task.clone(),
                feature: feature.to_string(),
                historical_count: history.len(),
                historical_mean,
                historical_std,
                current_mean,
                z_score,
            });
        }

        let cur_by_branch = group(&current_branches, &cur);
        let hist_by_branch = group(&historical_branches, &hist);
        let mut task_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for branch in current_branches.iter().flatten() {
            *task_counts.entry(branch.as_str()).or_insert(0) += 1;
        }
        for (branch, count) in task_counts {
            let current_values = cur_by_branch.get(branch).map(Vec::as_slice).unwrap_or(&[]);
            let history = hist_by_branch.get(branch).map(Vec::as_slice).unwrap_or(&[]);
            stats.branch_stats.push(BranchStat {
                branch: branch.to_string(),
                feature: feature.to_string(),
                task_count: count,
                historical_mean: mean(history),
                current_mean: mean(current_values),
            });
        }
    }

    tracing::debug!(
        key_column,
        tasks = stats.task_stats.len(),
        branches = stats.branch_stats.len(),
        "Structural statistics computed"
    );

    Ok(stats)
}

/// Branch of a hierarchical node id: everything before the last `:`.
pub fn branch_of(node_id: &str) -> &str {
    match node_id.rfind(':') {
        Some(idx) if idx > 0 => &node_id[..idx],
        _ => ROOT_BRANCH,
    }
}

fn key_label(value: &Value) -> Option<String> {
    if value.is_missing() {
        None
    } else {
        Some(value.to_field())
    }
}

fn row_keys(dataset: &Dataset, column: &str) -> Vec<Option<String>> {
    match dataset.column(column) {
        Some(cells) => cells.into_iter().map(key_label).collect(),
        None => vec![None; dataset.n_rows()],
    }
}

fn row_branches(dataset: &Dataset) -> Vec<Option<String>> {
    match dataset.column(NODE_ID_COLUMN) {
        Some(cells) => cells
            .into_iter()
            .map(|cell| match key_label(cell) {
                Some(id) => Some(branch_of(&id).to_string()),
                None => Some(ROOT_BRANCH.to_string()),
            })
            .collect(),
        None => vec![Some(ROOT_BRANCH.to_string()); dataset.n_rows()],
    }
}

fn numeric_or_missing(dataset: &Dataset, column: &str) -> Vec<Option<f64>> {
    dataset
        .numeric_column(column)
        .unwrap_or_else(|| vec![None; dataset.n_rows()])
}

fn group(keys: &[Option<String>], values: &[Option<f64>]) -> BTreeMap<String, Vec<f64>> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (key, value) in keys.iter().zip(values) {
        if let Some(key) = key {
            let entry = groups.entry(key.clone()).or_default();
            if let Some(v) = value {
                entry.push(*v);
            }
        }
    }
    groups
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
