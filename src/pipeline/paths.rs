//! Per-user filesystem layout.
//!
//! ```text
//! <base>/files/<user>/csvs            historical data
//! <base>/files/<user>/report/figures  figure data series
//! <base>/reports/<user>               rendered reports
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::dataset::Granularity;

use super::config::{validate_user, ConfigError};

/// Errors raised while preparing the per-user layout.
#[derive(Debug, Error)]
pub enum PathsError {
    #[error("Invalid user: {0}")]
    User(#[from] ConfigError),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Locations used by one invocation for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathsMap {
    /// Workflow summary to ingest.
    pub input_file: PathBuf,
    /// Directory receiving the rendered report.
    pub output_dir: PathBuf,
    /// Directory holding the historical datasets.
    pub hist_dir: PathBuf,
    /// Directory receiving figure data.
    pub figures_dir: PathBuf,
}

impl PathsMap {
    /// Derives the layout without touching the filesystem.
    pub fn resolve(base_dir: &Path, user: &str, input_file: &Path) -> Self {
        let user_dir = base_dir.join("files").join(user);
        Self {
            input_file: base_dir.join(input_file),
            output_dir: base_dir.join("reports").join(user),
            hist_dir: user_dir.join("csvs"),
            figures_dir: user_dir.join("report").join("figures"),
        }
    }

    /// Validates the user, derives the layout and creates its directories.
    pub fn prepare(base_dir: &Path, user: &str, input_file: &Path) -> Result<Self, PathsError> {
        validate_user(user)?;
        let paths = Self::resolve(base_dir, user, input_file);
        paths.ensure_directories()?;
        Ok(paths)
    }

    /// Creates the history, figures and report directories if absent.
    pub fn ensure_directories(&self) -> Result<(), PathsError> {
        for dir in [&self.hist_dir, &self.figures_dir, &self.output_dir] {
            std::fs::create_dir_all(dir).map_err(|source| PathsError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Path of the persisted historical dataset for a granularity.
    pub fn historical_file(&self, granularity: Granularity) -> PathBuf {
        self.hist_dir
            .join(format!("{}.csv", granularity.history_stem()))
    }
}
