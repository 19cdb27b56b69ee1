//! Tabular file merging with positional column reconciliation.
//!
//! Combines an ordered collection of CSV files into one. Each surviving table
//! has its columns renamed to the positional scheme `CH0..CH(k-1)` before the
//! rows are concatenated, so merged column identity encodes position rather
//! than original channel semantics. Input order is caller-controlled; the
//! orchestrator pre-sorts batch output by modification time.
//!
//! Tables of differing widths are still merged: rows from narrower tables get
//! empty cells in the higher-numbered columns, and a positional name can
//! cover semantically different source channels. Callers that need aligned
//! semantics must feed same-layout captures.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, warn};

use crate::core::loaders::{self, ChannelTable, Column};
use crate::core::writers;

/// Concatenate tables under the union of positional column names.
///
/// Per-table row order is preserved and tables are appended in the order
/// given. The output width is the widest input's column count.
pub fn concat_tables(tables: &[ChannelTable]) -> ChannelTable {
    let width = tables.iter().map(|t| t.num_columns()).max().unwrap_or(0);
    let total_rows: usize = tables.iter().map(|t| t.num_rows()).sum();

    let mut columns: Vec<Column> = (0..width)
        .map(|i| Column::new(format!("CH{}", i), Vec::with_capacity(total_rows)))
        .collect();

    for table in tables {
        for row in 0..table.num_rows() {
            for (col, column) in columns.iter_mut().enumerate() {
                column.values.push(table.cell(row, col));
            }
        }
    }

    ChannelTable::from_columns(columns)
}

/// Merge tabular files into a single CSV under positional column names.
///
/// Empty and unreadable inputs are skipped with a logged notice; neither is
/// fatal to the merge. Returns the merged file path, or `None` when no table
/// survived filtering, in which case nothing is written and callers must skip
/// dependent stages.
///
/// # Arguments
///
/// * `paths` - Tabular files in the order they should be appended
/// * `output_dir` - Directory for the merged file
/// * `timestamp` - Timestamp fragment for the `merge_csv_<timestamp>.csv` name
pub fn merge_tables(
    paths: &[PathBuf],
    output_dir: &Path,
    timestamp: &str,
) -> Result<Option<PathBuf>> {
    let mut tables = Vec::with_capacity(paths.len());

    for path in paths {
        let mut table = match loaders::load_table_csv(path) {
            Ok(table) => table,
            Err(e) => {
                error!("Error reading {}: {}", path.display(), e);
                continue;
            }
        };

        if table.is_empty() {
            warn!("Skipping empty file: {}", path.display());
            continue;
        }

        table.rename_positional();
        println!(
            "Processed file: {} | Columns = {}, Rows = {}",
            path.display(),
            table.num_columns(),
            table.num_rows()
        );
        tables.push(table);
    }

    if tables.is_empty() {
        warn!("No valid tabular files to merge");
        return Ok(None);
    }

    let merged = concat_tables(&tables);
    let merged_path = output_dir.join(format!("merge_csv_{}.csv", timestamp));
    writers::write_table_csv(&merged_path, &merged)
        .with_context(|| format!("Failed to write merged table: {}", merged_path.display()))?;

    println!(
        "Merged {} files into {} | Columns = {}, Rows = {}",
        tables.len(),
        merged_path.display(),
        merged.num_columns(),
        merged.num_rows()
    );
    Ok(Some(merged_path))
}
