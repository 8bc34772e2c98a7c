//! Post-processing of model predictions.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::{Dataset, Value};
use crate::error::ProcessError;
use crate::pipeline::config::ModelSettings;

use super::model::{FeatureImportance, LabelKind, Predictions};

/// Current run enriched with predictions, plus the features that mattered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedResults {
    pub enriched: Dataset,
    /// Most important features first.
    pub important_features: Vec<String>,
    /// Aggregated weights of `important_features`, same order.
    pub weights: Vec<FeatureImportance>,
}

/// Adds prediction columns to `current` and ranks features.
///
/// Each label contributes a `predicted_<label>` column; numeric regressor
/// labels that the current run also carries get a `residual_<label>` column
/// (observed minus predicted). Feature weights are summed across labels,
/// zero weights dropped, and the top `settings.top_features` kept.
pub fn process(
    predictions: &Predictions,
    current: &Dataset,
    settings: &ModelSettings,
) -> Result<ProcessedResults, ProcessError> {
    let mut enriched = current.clone();
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();

    for prediction in &predictions.labels {
        if prediction.predictions.len() != current.n_rows() {
            return Err(ProcessError::RowCountMismatch {
                label: prediction.label.clone(),
                expected: current.n_rows(),
                actual: prediction.predictions.len(),
            });
        }

        enriched.add_column(
            format!("predicted_{}", prediction.label),
            prediction.predictions.clone(),
        )?;

        if prediction.kind == LabelKind::Regressor {
            if let Some(observed) = current.column(&prediction.label) {
                let residuals = observed
                    .iter()
                    .zip(&prediction.predictions)
                    .map(|(actual, predicted)| match (actual.as_f64(), predicted.as_f64()) {
                        (Some(a), Some(p)) => Value::Float(a - p),
                        _ => Value::Missing,
                    })
                    .collect();
                enriched.add_column(format!("residual_{}", prediction.label), residuals)?;
            }
        }

        for importance in &prediction.importances {
            *totals.entry(importance.feature.as_str()).or_insert(0.0) += importance.weight;
        }
    }

    let mut weights: Vec<FeatureImportance> = totals
        .into_iter()
        .filter(|(_, weight)| *weight > 0.0)
        .map(|(feature, weight)| FeatureImportance {
            feature: feature.to_string(),
            weight,
        })
        .collect();
    weights.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    weights.truncate(settings.top_features);

    Ok(ProcessedResults {
        important_features: weights.iter().map(|w| w.feature.clone()).collect(),
        enriched,
        weights,
    })
}
