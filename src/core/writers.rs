//! Tabular data writers.
//!
//! Writes a [`ChannelTable`] to delimited text with a header row and one row
//! per sample index. No synthetic index column is emitted; `NaN` cells become
//! empty fields.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::loaders::ChannelTable;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Formats a cell value, mapping `NaN` to an empty field.
fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Write a channel table to a CSV file.
///
/// Creates a CSV file with the table's column names as the header and one
/// row per sample index. Output is deterministic: converting the same input
/// twice produces byte-identical files.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `table` - Channel table to write
///
/// # Errors
///
/// Returns an error if parent directories cannot be created or the file
/// cannot be created or written to.
pub fn write_table_csv(path: &Path, table: &ChannelTable) -> Result<()> {
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let buf_writer = BufWriter::new(file);
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();

    csv_writer
        .write_record(table.column_names())
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for row in 0..table.num_rows() {
        let record: Vec<String> = (0..table.num_columns())
            .map(|col| format_cell(table.cell(row, col)))
            .collect();
        csv_writer
            .write_record(&record)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::Column;
    use std::fs;
    use tempfile::tempdir;

    fn create_test_table() -> ChannelTable {
        ChannelTable::from_columns(vec![
            Column::new("CH0", vec![1.0, 2.0, 3.0]),
            Column::new("CH1", vec![4.5, 5.5]),
        ])
    }

    #[test]
    fn test_write_table_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.csv");

        write_table_csv(&path, &create_test_table()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "CH0,CH1");
        assert_eq!(lines[1], "1,4.5");
        assert_eq!(lines.len(), 4); // header + 3 data rows
    }

    #[test]
    fn test_write_table_csv_nan_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.csv");

        write_table_csv(&path, &create_test_table()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        // CH1 was padded to 3 rows with NaN
        assert_eq!(lines[3], "3,");
    }

    #[test]
    fn test_write_table_csv_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("test.csv");

        write_table_csv(&path, &create_test_table()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_write_table_csv_deterministic() {
        let dir = tempdir().unwrap();
        let table = create_test_table();

        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");
        write_table_csv(&first, &table).unwrap();
        write_table_csv(&second, &table).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }
}
