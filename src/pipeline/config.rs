//! Pipeline configuration for a single analysis invocation.
//!
//! The configuration is built once per invocation (from CLI arguments, an
//! optional YAML selection file and environment variables) and passed by
//! reference into every component. Nothing here is process-global.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of neighbours used by the model stage.
pub const DEFAULT_NEIGHBORS: usize = 5;

/// Default number of important features carried into the report.
pub const DEFAULT_TOP_FEATURES: usize = 10;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or argument has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading a selection file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The selection file is not valid YAML.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Prediction targets for one granularity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    /// Non-continuous targets to classify.
    #[serde(default)]
    pub classifier: BTreeSet<String>,
    /// Continuous numeric targets to regress.
    #[serde(default)]
    pub regressor: BTreeSet<String>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.classifier.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_regressor(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regressor.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Union of classifier and regressor names.
    pub fn all_labels(&self) -> BTreeSet<String> {
        self.classifier.union(&self.regressor).cloned().collect()
    }

    /// Adds every label of `other`.
    pub fn merge(&mut self, other: LabelMap) {
        self.classifier.extend(other.classifier);
        self.regressor.extend(other.regressor);
    }
}

/// Columns the user wants retained. Empty means "all columns".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSelection(BTreeSet<String>);

impl FeatureSelection {
    /// Selection that keeps every column.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of(features: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(features.into_iter().map(Into::into).collect())
    }

    /// True when no specific features were requested.
    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    pub fn features(&self) -> &BTreeSet<String> {
        &self.0
    }

    /// Requested features plus every label name, or `None` when the
    /// selection keeps all columns.
    pub fn important_columns(&self, labels: &LabelMap) -> Option<BTreeSet<String>> {
        if self.is_all() {
            return None;
        }
        let mut columns = self.0.clone();
        columns.extend(labels.all_labels());
        Some(columns)
    }

    pub fn extend(&mut self, features: impl IntoIterator<Item = String>) {
        self.0.extend(features);
    }
}

/// Feature selection and labels for one granularity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranularitySelection {
    #[serde(default)]
    pub features: FeatureSelection,
    #[serde(default)]
    pub labels: LabelMap,
}

/// Tunables of the model and result-processing stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Number of historical neighbours consulted per prediction.
    pub neighbors: usize,
    /// Maximum number of important features kept per granularity.
    pub top_features: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            neighbors: DEFAULT_NEIGHBORS,
            top_features: DEFAULT_TOP_FEATURES,
        }
    }
}

/// YAML file listing feature and label selections.
///
/// ```yaml
/// task_features: [executionDuration, state]
/// task_labels:
///   regressor: [executionDuration]
/// workflow_labels:
///   classifier: [state]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionFile {
    pub task_features: Vec<String>,
    pub workflow_features: Vec<String>,
    pub task_labels: LabelMap,
    pub workflow_labels: LabelMap,
}

impl SelectionFile {
    /// Loads a selection file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Configuration for one analysis invocation.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Installation root under which per-user data lives.
    pub base_dir: PathBuf,
    /// User the run belongs to.
    pub user: String,
    /// Workflow summary to analyse, relative to `base_dir` unless absolute.
    pub input_file: PathBuf,
    /// Task-level selection.
    pub task: GranularitySelection,
    /// Workflow-level selection.
    pub workflow: GranularitySelection,
    /// Model tunables.
    pub model: ModelSettings,
}

impl AnalysisConfig {
    /// Creates a configuration with empty selections and default settings.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        user: impl Into<String>,
        input_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            user: user.into(),
            input_file: input_file.into(),
            task: GranularitySelection::default(),
            workflow: GranularitySelection::default(),
            model: ModelSettings::default(),
        }
    }

    pub fn with_task_features(mut self, features: FeatureSelection) -> Self {
        self.task.features = features;
        self
    }

    pub fn with_workflow_features(mut self, features: FeatureSelection) -> Self {
        self.workflow.features = features;
        self
    }

    pub fn with_task_labels(mut self, labels: LabelMap) -> Self {
        self.task.labels = labels;
        self
    }

    pub fn with_workflow_labels(mut self, labels: LabelMap) -> Self {
        self.workflow.labels = labels;
        self
    }

    pub fn with_model_settings(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    /// Unions the entries of a selection file into this configuration.
    pub fn merge_selection_file(&mut self, file: SelectionFile) {
        self.task.features.extend(file.task_features);
        self.workflow.features.extend(file.workflow_features);
        self.task.labels.merge(file.task_labels);
        self.workflow.labels.merge(file.workflow_labels);
    }

    /// Overrides model settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WAS_NEIGHBORS`: neighbours per prediction (default: 5)
    /// - `WAS_TOP_FEATURES`: important features kept (default: 10)
    ///
    /// The base directory variable `WAS_HOME` is read by the CLI, which
    /// lets an explicit `--base-dir` take precedence.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("WAS_NEIGHBORS") {
            self.model.neighbors = parse_env_value(&val, "WAS_NEIGHBORS")?;
        }
        if let Ok(val) = std::env::var("WAS_TOP_FEATURES") {
            self.model.top_features = parse_env_value(&val, "WAS_TOP_FEATURES")?;
        }
        Ok(self)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_user(&self.user)?;

        if self.input_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "input file must not be empty".to_string(),
            ));
        }

        if self.model.neighbors == 0 {
            return Err(ConfigError::ValidationFailed(
                "neighbors must be at least 1".to_string(),
            ));
        }

        if self.model.top_features == 0 {
            return Err(ConfigError::ValidationFailed(
                "top_features must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Checks that a username is usable as a single directory name.
pub fn validate_user(user: &str) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "user".to_string(),
        message: message.to_string(),
    };

    if user.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if user == "." || user == ".." {
        return Err(invalid("must not be a relative directory name"));
    }
    if user.contains('/') || user.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    Ok(())
}

/// Parses an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
