//! CSV persistence for datasets.
//!
//! Files carry a header row with the column names; empty fields are missing
//! values. Writes go through a temporary file in the target directory that is
//! renamed over the destination, so readers never observe a half-written
//! file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;

use crate::error::TabularError;

use super::{Dataset, Value};

/// Reads a CSV file into a dataset, inferring cell types.
///
/// An empty file reads as a dataset with no columns and no rows.
pub fn read_csv(path: &Path) -> Result<Dataset, TabularError> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut dataset = Dataset::new(headers)?;

    for record in reader.records() {
        let record = record?;
        let row = record.iter().map(Value::parse_field).collect();
        dataset.push_row(row)?;
    }

    Ok(dataset)
}

/// Writes a dataset to `path`, replacing any previous file.
///
/// A dataset without columns is written as an empty file, which
/// [`read_csv`] reads back as an empty dataset.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<(), TabularError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staging = NamedTempFile::new_in(dir)?;

    // An empty header record would be written as `""` and read back as a
    // column named "".
    if dataset.n_columns() > 0 {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(staging.as_file()));
        writer.write_record(dataset.columns())?;
        for row in dataset.rows() {
            writer.write_record(row.iter().map(Value::to_field))?;
        }
        let mut inner = writer
            .into_inner()
            .map_err(|e| TabularError::Io(e.into_error()))?;
        inner.flush()?;
    }

    staging.as_file().sync_all()?;
    staging.persist(path)?;
    Ok(())
}
