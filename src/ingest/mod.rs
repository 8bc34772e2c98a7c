//! Workflow summary ingestion.
//!
//! Turns a JSON workflow summary into two run records: one row per
//! node/task and a single row for the workflow itself.
//!
//! The summary may be wrapped in a `workflowSummary` object. It must hold a
//! `workflow` object with a `nodes` array:
//!
//! ```json
//! {
//!   "workflowSummary": {
//!     "environment": { "os": "linux" },
//!     "workflow": {
//!       "name": "etl",
//!       "nodes": [
//!         { "id": "0:1", "name": "CSV Reader",
//!           "executionStatistics": { "executionDurationSinceStart": 120 } }
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Nested objects become dotted column names
//! (`executionStatistics.executionDurationSinceStart`), arrays become a
//! `<key>.count` column, and nodes of nested (meta)node workflows are emitted
//! as rows of their own with a `parentId` column.

use std::path::Path;

use serde_json::{Map, Value as Json};

use crate::dataset::{Dataset, Granularity, Value};
use crate::error::IngestError;

/// Task-level and workflow-level records of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecords {
    pub tasks: Dataset,
    pub workflow: Dataset,
}

impl RunRecords {
    /// Record of one granularity.
    pub fn get(&self, granularity: Granularity) -> &Dataset {
        match granularity {
            Granularity::Task => &self.tasks,
            Granularity::Workflow => &self.workflow,
        }
    }
}

/// Reads and parses a workflow summary file.
pub fn parse_summary_file(path: &Path) -> Result<RunRecords, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_summary(&content)
}

/// Parses a workflow summary document.
pub fn parse_summary(content: &str) -> Result<RunRecords, IngestError> {
    let document: Json = serde_json::from_str(content)?;
    let root = match document.get("workflowSummary") {
        Some(inner) => inner,
        None => &document,
    };
    let root = as_object(root, "workflowSummary")?;

    let workflow = root
        .get("workflow")
        .ok_or_else(|| IngestError::MissingKey("workflow".to_string()))?;
    let workflow = as_object(workflow, "workflow")?;

    let nodes = workflow
        .get("nodes")
        .ok_or_else(|| IngestError::MissingKey("workflow.nodes".to_string()))?;

    let mut task_records = Vec::new();
    collect_nodes(nodes, "workflow.nodes", None, &mut task_records)?;

    let mut workflow_record = Vec::new();
    for (key, value) in workflow {
        if key != "nodes" {
            flatten_into(key, value, &mut workflow_record);
        }
    }
    if let Some(environment) = root.get("environment") {
        flatten_into("environment", environment, &mut workflow_record);
    }
    workflow_record.push((
        "nodeCount".to_string(),
        Value::Int(task_records.len() as i64),
    ));

    Ok(RunRecords {
        tasks: Dataset::from_records(task_records),
        workflow: Dataset::from_records(vec![workflow_record]),
    })
}

fn as_object<'a>(value: &'a Json, key: &str) -> Result<&'a Map<String, Json>, IngestError> {
    value.as_object().ok_or_else(|| IngestError::MalformedValue {
        key: key.to_string(),
        reason: format!("expected an object, found {}", json_kind(value)),
    })
}

fn collect_nodes(
    nodes: &Json,
    key: &str,
    parent: Option<&str>,
    records: &mut Vec<Vec<(String, Value)>>,
) -> Result<(), IngestError> {
    let nodes = nodes.as_array().ok_or_else(|| IngestError::MalformedValue {
        key: key.to_string(),
        reason: format!("expected an array, found {}", json_kind(nodes)),
    })?;

    for (idx, node) in nodes.iter().enumerate() {
        let node_key = format!("{}[{}]", key, idx);
        let node = as_object(node, &node_key)?;

        let mut record = Vec::new();
        for (field, value) in node {
            if field == "workflow" && value.get("nodes").is_some() {
                continue;
            }
            flatten_into(field, value, &mut record);
        }
        if let Some(parent) = parent {
            record.push(("parentId".to_string(), Value::Text(parent.to_string())));
        }
        records.push(record);

        if let Some(inner) = node.get("workflow").and_then(|w| w.get("nodes")) {
            let id = node.get("id").map(json_label).unwrap_or_else(|| node_key.clone());
            collect_nodes(inner, &format!("{}.workflow.nodes", node_key), Some(&id), records)?;
        }
    }
    Ok(())
}

fn flatten_into(prefix: &str, value: &Json, out: &mut Vec<(String, Value)>) {
    match value {
        Json::Object(map) => {
            for (key, inner) in map {
                flatten_into(&format!("{}.{}", prefix, key), inner, out);
            }
        }
        Json::Array(items) => {
            out.push((format!("{}.count", prefix), Value::Int(items.len() as i64)));
        }
        scalar => {
            if let Some(cell) = Value::from_json_scalar(scalar) {
                out.push((prefix.to_string(), cell));
            }
        }
    }
}

fn json_label(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
