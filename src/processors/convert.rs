//! TDMS capture to CSV conversion.
//!
//! Converts single capture files and whole directories. Directory batches run
//! on the Rayon pool with a channel fan-in: each worker pushes its own result,
//! the caller drains after the parallel loop has joined, and one file's
//! failure never aborts its siblings.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use log::error;
use rayon::prelude::*;

use crate::core::decoder;
use crate::core::writers;

/// File extension of capture files, matched case-insensitively.
pub const CAPTURE_EXTENSION: &str = "tdms";

/// Remove all space characters from a file name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars().filter(|c| *c != ' ').collect()
}

/// Derive the tabular output name for a capture path.
///
/// The base name is sanitized and the capture extension replaced with `csv`.
fn tabular_name(capture: &Path) -> PathBuf {
    let base = capture
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = PathBuf::from(sanitize_file_name(&base));
    name.set_extension("csv");
    name
}

/// Convert a single capture file to a CSV file and return the CSV path.
///
/// The capture is decoded in full; column identities are the decoder-supplied
/// channel names and no synthetic index column is added. A decode failure
/// (including a capture with no channel data) propagates to the caller.
///
/// # Arguments
///
/// * `capture` - Path to the capture file
/// * `output_dir` - Directory the CSV file is written into
pub fn convert_capture(capture: &Path, output_dir: &Path) -> Result<PathBuf> {
    let table = decoder::read_capture(capture)
        .with_context(|| format!("Failed to decode capture: {}", capture.display()))?;

    let csv_path = output_dir.join(tabular_name(capture));
    writers::write_table_csv(&csv_path, &table)
        .with_context(|| format!("Failed to write table: {}", csv_path.display()))?;

    println!("Converted {} to {}", capture.display(), csv_path.display());
    Ok(csv_path)
}

/// Discover capture files in a directory, sorted lexicographically by name.
pub fn discover_captures(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("Failed to read directory: {}", folder.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(CAPTURE_EXTENSION))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Convert every capture file in a directory concurrently.
///
/// Discovery order is deterministic (lexicographic); completion order is not,
/// and the returned list reflects completion order. Callers needing a stable
/// order must re-sort, see [`sort_by_mtime`]. A failed conversion is logged
/// and excluded from the result without affecting sibling conversions.
///
/// # Arguments
///
/// * `folder` - Directory containing capture files
/// * `output_dir` - Directory the CSV files are written into
///
/// # Returns
///
/// The paths of all successfully written CSV files.
pub fn convert_all(folder: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let captures = discover_captures(folder)?;

    let (sender, receiver) = mpsc::channel();
    captures.par_iter().for_each_with(sender, |tx, capture| {
        match convert_capture(capture, output_dir) {
            Ok(csv_path) => {
                // The receiver outlives the parallel loop, send cannot fail
                let _ = tx.send(csv_path);
            }
            Err(e) => error!("Failed to convert {}: {:#}", capture.display(), e),
        }
    });

    // All senders are dropped once the parallel loop joins
    Ok(receiver.iter().collect())
}

/// Sort paths by file modification time, ascending.
///
/// Ties fall back to path order so the result is deterministic. Paths whose
/// metadata cannot be read sort first.
pub fn sort_by_mtime(paths: &mut [PathBuf]) {
    paths.sort_by_key(|path| {
        let mtime: Option<SystemTime> = fs::metadata(path).and_then(|m| m.modified()).ok();
        (mtime, path.clone())
    });
}
