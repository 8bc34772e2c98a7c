//! Persistent per-user storage.
//!
//! The only persisted state is the historical dataset of each user, one flat
//! CSV file per granularity under the user's historical-data directory:
//!
//! - `tasks_historical_data.csv`: one row per task/node execution ever seen
//! - `workflow_historical_data.csv`: one row per workflow execution
//!
//! # Usage
//!
//! ```rust,ignore
//! use workflow_analysis::dataset::Granularity;
//! use workflow_analysis::storage::HistoricalStore;
//!
//! let store = HistoricalStore::new(paths.hist_dir.clone());
//! let history = store.load_both()?;
//! if let Some((tasks, workflow)) = history.both() {
//!     // run the analysis stages
//! }
//! store.merge_and_persist(Granularity::Task, history.tasks.as_ref(), &records.tasks)?;
//! ```
//!
//! Concurrent invocations for the same user are not coordinated; the last
//! writer wins.

pub mod history;

pub use history::{
    merge_and_persist, HistoricalStore, HistoryPair, HistorySummary, PersistedHistory,
};
