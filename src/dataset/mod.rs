//! Tabular datasets for run records and historical data.
//!
//! A [`Dataset`] is a small row-major table: an ordered list of unique
//! column names plus rows of [`Value`] cells, each row exactly as wide as the
//! column list. Both granularities (task and workflow) share this shape.
//!
//! The [`tabular`] submodule persists datasets as flat CSV files.

pub mod tabular;
pub mod value;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

pub use tabular::{read_csv, write_csv};
pub use value::Value;

/// Observation granularity of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One row per node/task execution.
    Task,
    /// One row per workflow execution.
    Workflow,
}

impl Granularity {
    /// Both granularities, task first.
    pub const ALL: [Granularity; 2] = [Granularity::Task, Granularity::Workflow];

    /// File stem of the persisted historical dataset.
    pub fn history_stem(&self) -> &'static str {
        match self {
            Granularity::Task => "tasks_historical_data",
            Granularity::Workflow => "workflow_historical_data",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Task => write!(f, "task"),
            Granularity::Workflow => write!(f, "workflow"),
        }
    }
}

/// Row-major table with named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Creates an empty dataset with the given columns.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::DuplicateColumn` if a name appears twice.
    pub fn new<I, S>(columns: I) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut seen = BTreeSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Creates a dataset from columns and rows, checking row widths.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self, DatasetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dataset = Self::new(columns)?;
        for row in rows {
            dataset.push_row(row)?;
        }
        Ok(dataset)
    }

    /// Builds a dataset from keyed records.
    ///
    /// Columns appear in first-seen order across all records; a record that
    /// lacks a column gets `Value::Missing` there. A key repeated within one
    /// record keeps its last value.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Vec<(String, Value)>>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut keyed_rows: Vec<Vec<(usize, Value)>> = Vec::new();

        for record in records {
            let mut cells = Vec::with_capacity(record.len());
            for (key, value) in record {
                let idx = match index.get(&key) {
                    Some(idx) => *idx,
                    None => {
                        let idx = columns.len();
                        index.insert(key.clone(), idx);
                        columns.push(key);
                        idx
                    }
                };
                cells.push((idx, value));
            }
            keyed_rows.push(cells);
        }

        let width = columns.len();
        let rows = keyed_rows
            .into_iter()
            .map(|cells| {
                let mut row = vec![Value::Missing; width];
                for (idx, value) in cells {
                    row[idx] = value;
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::RowWidth` if the row is not as wide as the
    /// column list.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), DatasetError> {
        if row.len() != self.columns.len() {
            return Err(DatasetError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns the cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Returns a single cell.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Projects onto exactly `names`, keeping this dataset's column order.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::UnknownColumns` listing every requested name
    /// that is not a column of this dataset. Nothing is projected in that
    /// case.
    pub fn select(&self, names: &BTreeSet<String>) -> Result<Self, DatasetError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.has_column(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DatasetError::UnknownColumns(missing));
        }
        Ok(self.project(|name| names.contains(name)))
    }

    /// Projects onto the columns that are both present here and listed in
    /// `names`. Requested names that are absent are ignored.
    pub fn select_available(&self, names: &BTreeSet<String>) -> Self {
        self.project(|name| names.contains(name))
    }

    fn project(&self, keep: impl Fn(&str) -> bool) -> Self {
        let kept: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| keep(name))
            .map(|(idx, _)| idx)
            .collect();

        Self {
            columns: kept.iter().map(|&idx| self.columns[idx].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| kept.iter().map(|&idx| row[idx].clone()).collect())
                .collect(),
        }
    }

    /// Column-union, row-concatenation of `self` followed by `other`.
    ///
    /// The result keeps every column of `self` in place and appends the
    /// columns only `other` has, in `other`'s order. Cells for columns a side
    /// lacks are `Value::Missing`. Rows are never deduplicated.
    pub fn union_concat(&self, other: &Dataset) -> Self {
        let mut columns = self.columns.clone();
        for name in &other.columns {
            if !self.has_column(name) {
                columns.push(name.clone());
            }
        }

        let width = columns.len();
        let mut rows = Vec::with_capacity(self.rows.len() + other.rows.len());
        for row in &self.rows {
            let mut widened = row.clone();
            widened.resize(width, Value::Missing);
            rows.push(widened);
        }

        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| columns.iter().position(|c| c == name).unwrap_or(width))
            .collect();
        for row in &other.rows {
            let mut placed = vec![Value::Missing; width];
            for (src, &dst) in mapping.iter().enumerate() {
                if dst < width {
                    placed[dst] = row[src].clone();
                }
            }
            rows.push(placed);
        }

        Self { columns, rows }
    }

    /// Appends a column.
    ///
    /// # Errors
    ///
    /// Fails if the name already exists or the value count does not match
    /// the row count.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), DatasetError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(DatasetError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(DatasetError::RowWidth {
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Numeric view of a column: `None` for cells without a numeric value.
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.column(name)
            .map(|cells| cells.into_iter().map(Value::as_f64).collect())
    }

    /// Returns true if the column exists, has at least one observation, and
    /// every observation is numeric.
    pub fn is_numeric_column(&self, name: &str) -> bool {
        match self.column(name) {
            Some(cells) => {
                let mut observed = false;
                for cell in cells {
                    match cell {
                        Value::Missing => {}
                        Value::Int(_) | Value::Float(_) | Value::Bool(_) => observed = true,
                        Value::Text(_) => return false,
                    }
                }
                observed
            }
            None => false,
        }
    }
}
