//! Tabular data model and CSV loading.
//!
//! This module provides the in-memory channel table shared by the converter,
//! the merge reconciler and the transform dispatcher, plus a parser for the
//! CSV files the pipeline writes and re-reads.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during tabular file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A single named column of numeric samples.
///
/// Missing cells are represented as `NaN` and written back as empty fields.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column identifier (channel name before merge, `CHk` after)
    pub name: String,
    /// Sample values, `NaN` where the source had no value
    pub values: Vec<f64>,
}

impl Column {
    /// Creates a named column from its values.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Container for tabular channel data.
///
/// All columns share the same length; shorter source columns are padded with
/// `NaN` at construction time.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    columns: Vec<Column>,
    num_rows: usize,
}

impl ChannelTable {
    /// Creates a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table from columns, padding shorter columns with `NaN`.
    pub fn from_columns(mut columns: Vec<Column>) -> Self {
        let num_rows = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
        for column in &mut columns {
            column.values.resize(num_rows, f64::NAN);
        }
        Self { columns, num_rows }
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns the number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns true if the table has no columns or no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.num_rows == 0
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the values of the named column, if present.
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Returns the cell at (row, col), `NaN` when out of range.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> f64 {
        self.columns
            .get(col)
            .and_then(|c| c.values.get(row))
            .copied()
            .unwrap_or(f64::NAN)
    }

    /// Renames all columns to the positional scheme `CH0..CH(k-1)`.
    ///
    /// The positional name encodes column order, not the original channel
    /// identity.
    pub fn rename_positional(&mut self) {
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.name = format!("CH{}", i);
        }
    }
}

/// Load a tabular CSV file into a [`ChannelTable`].
///
/// The first row is taken as the header. Cells that are empty or fail to
/// parse as a number become `NaN`; rows shorter than the header are padded
/// the same way.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not structurally
/// valid CSV (for example, not valid UTF-8).
pub fn load_table_csv<P: AsRef<Path>>(path: P) -> Result<ChannelTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let mut columns: Vec<Column> = headers
        .iter()
        .map(|name| Column::new(name, Vec::new()))
        .collect();

    for result in reader.records() {
        let record = result?;
        for (i, column) in columns.iter_mut().enumerate() {
            let value = record
                .get(i)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse().ok())
                .unwrap_or(f64::NAN);
            column.values.push(value);
        }
    }

    Ok(ChannelTable::from_columns(columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_columns_pads_short_columns() {
        let table = ChannelTable::from_columns(vec![
            Column::new("a", vec![1.0, 2.0, 3.0]),
            Column::new("b", vec![4.0]),
        ]);

        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.cell(0, 1), 4.0);
        assert!(table.cell(1, 1).is_nan());
        assert!(table.cell(2, 1).is_nan());
    }

    #[test]
    fn test_channel_lookup() {
        let table = ChannelTable::from_columns(vec![
            Column::new("sensor/temp", vec![1.0, 2.0]),
            Column::new("sensor/load", vec![3.0, 4.0]),
        ]);

        assert_eq!(table.channel("sensor/load"), Some(&[3.0, 4.0][..]));
        assert!(table.channel("missing").is_none());
    }

    #[test]
    fn test_rename_positional() {
        let mut table = ChannelTable::from_columns(vec![
            Column::new("left", vec![1.0]),
            Column::new("right", vec![2.0]),
        ]);

        table.rename_positional();
        assert_eq!(table.column_names(), vec!["CH0", "CH1"]);
    }

    #[test]
    fn test_empty_table() {
        assert!(ChannelTable::new().is_empty());
        assert!(ChannelTable::from_columns(vec![Column::new("a", Vec::new())]).is_empty());
    }

    #[test]
    fn test_load_table_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "CH0,CH1").unwrap();
        writeln!(file, "1.0,2.0").unwrap();
        writeln!(file, "3.0,4.0").unwrap();
        file.flush().unwrap();

        let table = load_table_csv(file.path())?;
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.channel("CH1"), Some(&[2.0, 4.0][..]));

        Ok(())
    }

    #[test]
    fn test_load_table_csv_missing_cells() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "CH0,CH1,CH2").unwrap();
        writeln!(file, "1.0,,3.0").unwrap();
        writeln!(file, "4.0").unwrap();
        file.flush().unwrap();

        let table = load_table_csv(file.path())?;
        assert_eq!(table.num_rows(), 2);
        assert!(table.cell(0, 1).is_nan());
        assert!(table.cell(1, 1).is_nan());
        assert!(table.cell(1, 2).is_nan());
        assert_eq!(table.cell(1, 0), 4.0);

        Ok(())
    }

    #[test]
    fn test_load_table_csv_header_only_is_empty() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "CH0,CH1").unwrap();
        file.flush().unwrap();

        let table = load_table_csv(file.path())?;
        assert!(table.is_empty());
        assert_eq!(table.num_columns(), 2);

        Ok(())
    }
}
