//! Nearest-neighbour baseline model.
//!
//! Every label of the label map is predicted for every row of the current
//! run from the most similar historical rows. Similarity is the Euclidean
//! distance over the numeric feature columns shared by both datasets, after
//! mean imputation and standardisation against the historical data.
//!
//! Regressor labels are predicted by the neighbour mean, classifier labels
//! by the neighbour majority. Feature importances are the absolute Pearson
//! correlation with the label for regressors and the correlation ratio for
//! classifiers, normalised to sum to one.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use crate::dataset::{Dataset, Value};
use crate::error::ModelError;
use crate::pipeline::config::{LabelMap, ModelSettings};

/// Kind of prediction target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Classifier,
    Regressor,
}

/// Relative weight of a feature in explaining a label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub weight: f64,
}

/// Predictions for one label, one value per row of the current run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelPrediction {
    pub label: String,
    pub kind: LabelKind,
    pub predictions: Vec<Value>,
    /// Sorted by descending weight.
    pub importances: Vec<FeatureImportance>,
    pub training_rows: usize,
}

/// Output of the model stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Predictions {
    pub labels: Vec<LabelPrediction>,
}

enum Targets {
    Numeric(Vec<f64>),
    Classes(Vec<String>),
}

/// Standardised feature matrices for training and query rows.
struct FeatureSpace {
    features: Vec<String>,
    train: Array2<f64>,
    query: Array2<f64>,
}

/// Predicts every label in `labels` for the rows of `current`.
///
/// # Errors
///
/// - `ModelError::MissingLabel` if a label column is absent from `historical`
/// - `ModelError::InvalidValue` if a regressor label holds a non-numeric value
/// - `ModelError::InsufficientData` if no historical row has a value for a label
pub fn predict(
    historical: &Dataset,
    current: &Dataset,
    labels: &LabelMap,
    settings: &ModelSettings,
) -> Result<Predictions, ModelError> {
    let all_labels = labels.all_labels();
    let features = shared_numeric_features(historical, current, &all_labels);

    let mut predictions = Predictions::default();
    let targets = labels
        .classifier
        .iter()
        .map(|l| (l, LabelKind::Classifier))
        .chain(labels.regressor.iter().map(|l| (l, LabelKind::Regressor)));

    for (label, kind) in targets {
        let column = historical
            .column(label)
            .ok_or_else(|| ModelError::MissingLabel(label.clone()))?;

        let training: Vec<usize> = column
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_missing())
            .map(|(idx, _)| idx)
            .collect();
        if training.is_empty() {
            return Err(ModelError::InsufficientData(format!(
                "no historical rows have a value for '{}'",
                label
            )));
        }

        let targets = match kind {
            LabelKind::Regressor => {
                let mut values = Vec::with_capacity(training.len());
                for &idx in &training {
                    let value = column[idx];
                    let number = value.as_f64().ok_or_else(|| ModelError::InvalidValue {
                        column: label.clone(),
                        reason: format!("expected a number, found '{}'", value),
                    })?;
                    values.push(number);
                }
                Targets::Numeric(values)
            }
            LabelKind::Classifier => {
                Targets::Classes(training.iter().map(|&idx| column[idx].to_field()).collect())
            }
        };

        let space = FeatureSpace::build(historical, current, &features, &training);
        let k = settings.neighbors.clamp(1, training.len());

        let values = (0..current.n_rows())
            .map(|row| {
                let neighbours = space.nearest(row, k);
                match &targets {
                    Targets::Numeric(y) => {
                        let sum: f64 = neighbours.iter().map(|&n| y[n]).sum();
                        Value::Float(sum / neighbours.len() as f64)
                    }
                    Targets::Classes(y) => Value::parse_field(&majority(&neighbours, y)),
                }
            })
            .collect();

        tracing::debug!(
            label = %label,
            features = space.features.len(),
            training_rows = training.len(),
            k,
            "Predicted label"
        );

        predictions.labels.push(LabelPrediction {
            label: label.clone(),
            kind,
            predictions: values,
            importances: space.importances(&targets),
            training_rows: training.len(),
        });
    }

    Ok(predictions)
}

/// Columns of `current` that `historical` also has with numeric data,
/// excluding labels.
fn shared_numeric_features(
    historical: &Dataset,
    current: &Dataset,
    labels: &BTreeSet<String>,
) -> Vec<String> {
    current
        .columns()
        .iter()
        .filter(|name| !labels.contains(*name))
        .filter(|name| historical.is_numeric_column(name))
        .cloned()
        .collect()
}

impl FeatureSpace {
    fn build(
        historical: &Dataset,
        current: &Dataset,
        features: &[String],
        training: &[usize],
    ) -> Self {
        let mut train = Array2::<f64>::zeros((training.len(), features.len()));
        let mut query = Array2::<f64>::zeros((current.n_rows(), features.len()));

        for (j, feature) in features.iter().enumerate() {
            let hist = historical.numeric_column(feature).unwrap_or_default();
            let observed: Vec<f64> = training.iter().filter_map(|&i| hist[i]).collect();
            let (mean, std) = mean_std(&observed);
            let scale = if std > 0.0 { std } else { 1.0 };

            for (i, &row) in training.iter().enumerate() {
                train[[i, j]] = (hist[row].unwrap_or(mean) - mean) / scale;
            }

            let cur = current
                .numeric_column(feature)
                .unwrap_or_else(|| vec![None; current.n_rows()]);
            for (i, value) in cur.iter().enumerate() {
                query[[i, j]] = (value.unwrap_or(mean) - mean) / scale;
            }
        }

        Self {
            features: features.to_vec(),
            train,
            query,
        }
    }

    /// Indices (into the training rows) of the `k` closest rows.
    fn nearest(&self, row: usize, k: usize) -> Vec<usize> {
        let point = self.query.row(row);
        let mut distances: Vec<(usize, f64)> = self
            .train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, train_row)| {
                let diff = &train_row - &point;
                (idx, diff.mapv(|d| d * d).sum())
            })
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        distances.into_iter().take(k).map(|(idx, _)| idx).collect()
    }

    fn importances(&self, targets: &Targets) -> Vec<FeatureImportance> {
        let raw: Vec<f64> = (0..self.features.len())
            .map(|j| {
                let x = self.train.column(j);
                let score = match targets {
                    Targets::Numeric(y) => pearson(x, y).abs(),
                    Targets::Classes(y) => correlation_ratio(x, y),
                };
                if score.is_finite() {
                    score
                } else {
                    0.0
                }
            })
            .collect();

        let total: f64 = raw.iter().sum();
        let mut importances: Vec<FeatureImportance> = self
            .features
            .iter()
            .zip(raw)
            .map(|(feature, score)| FeatureImportance {
                feature: feature.clone(),
                weight: if total > 0.0 { score / total } else { 0.0 },
            })
            .collect();
        importances.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        importances
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn pearson(x: ArrayView1<'_, f64>, y: &[f64]) -> f64 {
    let n = y.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_x = x.sum() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        cov += (xi - mean_x) * (yi - mean_y);
        var_x += (xi - mean_x).powi(2);
        var_y += (yi - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        0.0
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    }
}

/// Share of the feature's variance explained by the class grouping.
fn correlation_ratio(x: ArrayView1<'_, f64>, classes: &[String]) -> f64 {
    let n = classes.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean = x.sum() / n;
    let total: f64 = x.iter().map(|v| (v - mean).powi(2)).sum();
    if total == 0.0 {
        return 0.0;
    }

    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (value, class) in x.iter().zip(classes) {
        let entry = groups.entry(class.as_str()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    let between: f64 = groups
        .values()
        .map(|(sum, count)| {
            let group_mean = sum / *count as f64;
            *count as f64 * (group_mean - mean).powi(2)
        })
        .sum();
    between / total
}

/// Most frequent class among the neighbours; ties go to the smallest class.
fn majority(neighbours: &[usize], classes: &[String]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for &n in neighbours {
        *counts.entry(classes[n].as_str()).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (class, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((class, count));
        }
    }
    best.map(|(class, _)| class.to_string()).unwrap_or_default()
}
