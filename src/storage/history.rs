//! Append-only historical datasets, one CSV file per user and granularity.
//!
//! Each merge rewrites the whole file: existing rows are kept unchanged, the
//! new run's rows are appended, and columns are the union of both schemas.
//! The rewrite is staged in a temporary file and renamed into place.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::dataset::{read_csv, write_csv, Dataset, Granularity};
use crate::error::HistoryError;

/// Historical datasets for both granularities, as found on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPair {
    pub tasks: Option<Dataset>,
    pub workflow: Option<Dataset>,
}

impl HistoryPair {
    /// Both historical datasets, only when both files exist.
    pub fn both(&self) -> Option<(&Dataset, &Dataset)> {
        self.tasks.as_ref().zip(self.workflow.as_ref())
    }

    pub fn get(&self, granularity: Granularity) -> Option<&Dataset> {
        match granularity {
            Granularity::Task => self.tasks.as_ref(),
            Granularity::Workflow => self.workflow.as_ref(),
        }
    }
}

/// Shape of a persisted historical file after a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedHistory {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

/// Description of one historical file, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub granularity: Granularity,
    pub path: PathBuf,
    pub exists: bool,
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Store rooted at a user's historical-data directory.
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    dir: PathBuf,
}

impl HistoricalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the historical file for a granularity.
    pub fn path(&self, granularity: Granularity) -> PathBuf {
        self.dir.join(format!("{}.csv", granularity.history_stem()))
    }

    /// Loads the historical dataset if its file exists.
    ///
    /// # Errors
    ///
    /// A file that exists but cannot be parsed is an error rather than "no
    /// history", so that a later merge never overwrites data it could not
    /// read.
    pub fn load(&self, granularity: Granularity) -> Result<Option<Dataset>, HistoryError> {
        let path = self.path(granularity);
        if !path.is_file() {
            return Ok(None);
        }
        read_csv(&path)
            .map(Some)
            .map_err(|source| HistoryError { path, source })
    }

    /// Loads both granularities.
    pub fn load_both(&self) -> Result<HistoryPair, HistoryError> {
        Ok(HistoryPair {
            tasks: self.load(Granularity::Task)?,
            workflow: self.load(Granularity::Workflow)?,
        })
    }

    /// Appends `new_run` to the history of `granularity` and writes it back.
    pub fn merge_and_persist(
        &self,
        granularity: Granularity,
        existing: Option<&Dataset>,
        new_run: &Dataset,
    ) -> Result<PersistedHistory, HistoryError> {
        merge_and_persist(&self.path(granularity), existing, new_run)
    }

    /// Describes both historical files.
    pub fn summary(&self) -> Result<Vec<HistorySummary>, HistoryError> {
        Granularity::ALL
            .iter()
            .map(|&granularity| {
                let path = self.path(granularity);
                Ok(match self.load(granularity)? {
                    Some(dataset) => HistorySummary {
                        granularity,
                        path,
                        exists: true,
                        rows: dataset.n_rows(),
                        columns: dataset.columns().to_vec(),
                    },
                    None => HistorySummary {
                        granularity,
                        path,
                        exists: false,
                        rows: 0,
                        columns: Vec::new(),
                    },
                })
            })
            .collect()
    }
}

/// Writes `existing` followed by `new_run` to `path`.
///
/// With no existing history the new run becomes the initial dataset. The
/// merge is a column union: nothing previously stored is dropped, and rows
/// are not deduplicated.
pub fn merge_and_persist(
    path: &Path,
    existing: Option<&Dataset>,
    new_run: &Dataset,
) -> Result<PersistedHistory, HistoryError> {
    let merged;
    let to_write = match existing {
        Some(history) => {
            merged = history.union_concat(new_run);
            &merged
        }
        None => new_run,
    };

    write_csv(to_write, path).map_err(|source| HistoryError {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(PersistedHistory {
        path: path.to_path_buf(),
        rows: to_write.n_rows(),
        columns: to_write.n_columns(),
    })
}
