//! Reconciliation of requested columns against current and historical data.
//!
//! The current run must expose every requested feature and label; a missing
//! name is a hard stop. Historical data may lag behind the current schema, so
//! it is only narrowed to the requested columns it actually has.

use crate::dataset::{Dataset, Granularity};
use crate::error::{ColumnMismatchError, DatasetError};
use crate::pipeline::config::{FeatureSelection, LabelMap};

/// Current and historical views filtered to the important columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledViews {
    pub current: Dataset,
    pub historical: Option<Dataset>,
}

/// Filters `current` and `historical` down to the important columns.
///
/// With an empty feature selection both datasets come back unchanged (as
/// owned copies). Otherwise the important columns are the requested features
/// plus every label name; `current` is projected onto exactly those columns
/// and `historical` onto the subset it has. Rows are never dropped and the
/// inputs are never modified.
///
/// # Errors
///
/// Returns `ColumnMismatchError` listing every important column the current
/// run lacks.
pub fn reconcile(
    granularity: Granularity,
    features: &FeatureSelection,
    labels: &LabelMap,
    current: &Dataset,
    historical: Option<&Dataset>,
) -> Result<ReconciledViews, ColumnMismatchError> {
    let Some(important) = features.important_columns(labels) else {
        tracing::debug!(%granularity, "No features requested, keeping all columns");
        return Ok(ReconciledViews {
            current: current.clone(),
            historical: historical.cloned(),
        });
    };

    let filtered_current = current.select(&important).map_err(|e| match e {
        DatasetError::UnknownColumns(missing) => ColumnMismatchError {
            granularity,
            missing,
        },
        // `select` only reports unknown columns.
        other => ColumnMismatchError {
            granularity,
            missing: vec![other.to_string()],
        },
    })?;

    let filtered_historical = historical.map(|hist| {
        let narrowed = hist.select_available(&important);
        if narrowed.n_columns() < important.len() {
            tracing::debug!(
                %granularity,
                requested = important.len(),
                available = narrowed.n_columns(),
                "Historical data lacks some requested columns"
            );
        }
        narrowed
    });

    Ok(ReconciledViews {
        current: filtered_current,
        historical: filtered_historical,
    })
}
