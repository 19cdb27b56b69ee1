//! Command-line interface and pipeline orchestration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::config::PipelineConfig;
use crate::processors::dispatch::Algorithm;
use crate::processors::{convert, dispatch, merge};

#[derive(Parser)]
#[command(name = "tdms-pipeline")]
#[command(about = "Convert TDMS captures to CSV, optionally merge and transform them", version)]
pub struct Cli {
    /// TDMS capture file or directory to process
    path: PathBuf,

    /// Output directory for CSV files (default: <timestamp>_tdms under the cwd)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Whether to merge the converted CSV files
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    merge: bool,

    /// Whether to render transform images for the selected channels
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    transform: bool,

    /// Channel names used for transformation
    #[arg(long, num_args = 1.., required_if_eq("transform", "true"))]
    channels: Vec<String>,

    /// Transform algorithm selector
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=Algorithm::SELECTOR_MAX as i64),
        required_if_eq("transform", "true")
    )]
    algorithm: Option<u32>,

    /// Path to YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Transform stage parameters, present when transforms were requested.
pub struct TransformRequest {
    pub channels: Vec<String>,
    pub algorithm: u32,
}

/// Outcome counters for one pipeline run.
pub struct RunSummary {
    pub converted: usize,
    pub failed: usize,
    pub merged: Option<PathBuf>,
    pub artifacts: usize,
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.len() > 39 {
            format!("{}...", &value[..36])
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    if !cli.path.exists() {
        error!("Input path does not exist: {}", cli.path.display());
        std::process::exit(1);
    }

    let timestamp = Local::now().format("%Y%m%d%H%M").to_string();
    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}_tdms", timestamp)));

    if let Err(e) = fs::create_dir_all(&output_dir) {
        error!("Failed to create output directory {}: {}", output_dir.display(), e);
        std::process::exit(1);
    }

    // Transforms only run with both channels and an algorithm selected
    let transform = match (cli.transform, cli.algorithm) {
        (true, Some(algorithm)) => Some(TransformRequest {
            channels: cli.channels.clone(),
            algorithm,
        }),
        _ => None,
    };

    let start = Instant::now();

    let result = if cli.path.is_dir() {
        process_directory(
            &cli.path,
            &output_dir,
            cli.merge,
            transform.as_ref(),
            &timestamp,
            &config,
        )
    } else {
        process_file(&cli.path, &output_dir, transform.as_ref(), &config)
    };

    match result {
        Ok(summary) => {
            print_summary(
                "Pipeline Complete",
                &[
                    ("Input", cli.path.display().to_string()),
                    ("Output directory", output_dir.display().to_string()),
                    ("Files converted", summary.converted.to_string()),
                    ("Files failed", summary.failed.to_string()),
                    (
                        "Merged file",
                        summary
                            .merged
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "none".to_string()),
                    ),
                    ("Images rendered", summary.artifacts.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Pipeline failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Single-file pipeline: convert one capture, optionally transform its output.
///
/// Transforms run directly on the converted file; no merge stage is involved.
/// Any failure, including the decode of the one input, is fatal.
pub fn process_file(
    input: &Path,
    output_dir: &Path,
    transform: Option<&TransformRequest>,
    config: &PipelineConfig,
) -> Result<RunSummary> {
    let is_capture = input
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(convert::CAPTURE_EXTENSION))
        .unwrap_or(false);
    if !is_capture {
        anyhow::bail!("Not a capture file: {}", input.display());
    }

    let csv_path = convert::convert_capture(input, output_dir)?;

    let mut artifacts = 0;
    if let Some(request) = transform {
        artifacts =
            dispatch::dispatch_transforms(&csv_path, &request.channels, request.algorithm, config)?
                .len();
    }

    Ok(RunSummary {
        converted: 1,
        failed: 0,
        merged: None,
        artifacts,
    })
}

/// Directory pipeline: batch convert, then merge and/or transform.
///
/// Conversions run concurrently; per-file failures are logged and excluded
/// without aborting the batch. When merging, the surviving outputs are sorted
/// by modification time ascending before concatenation, and transforms apply
/// to the merged file. Without merging, transforms apply to every converted
/// file in turn.
pub fn process_directory(
    input: &Path,
    output_dir: &Path,
    should_merge: bool,
    transform: Option<&TransformRequest>,
    timestamp: &str,
    config: &PipelineConfig,
) -> Result<RunSummary> {
    println!("Processing captures in {}", input.display());
    println!("Output directory: {}", output_dir.display());

    let discovered = convert::discover_captures(input)?.len();

    let spinner = create_spinner("Converting capture files...");
    let mut outputs = convert::convert_all(input, output_dir)?;
    spinner.finish_and_clear();

    let failed = discovered.saturating_sub(outputs.len());

    let mut merged = None;
    let mut artifacts = 0;

    if should_merge && !outputs.is_empty() {
        convert::sort_by_mtime(&mut outputs);
        merged = merge::merge_tables(&outputs, output_dir, timestamp)?;

        // Transforms depend on a merged file actually existing
        if let (Some(merged_path), Some(request)) = (&merged, transform) {
            artifacts = dispatch::dispatch_transforms(
                merged_path,
                &request.channels,
                request.algorithm,
                config,
            )?
            .len();
        }
    } else if let Some(request) = transform {
        for csv_path in &outputs {
            artifacts += dispatch::dispatch_transforms(
                csv_path,
                &request.channels,
                request.algorithm,
                config,
            )?
            .len();
        }
    }

    Ok(RunSummary {
        converted: outputs.len(),
        failed,
        merged,
        artifacts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    // Minimal single-segment TDMS capture with one f64 channel
    fn write_capture(dir: &Path, name: &str, channel: &str, values: &[f64]) -> PathBuf {
        let object_path = format!("/'rig'/'{}'", channel);
        let mut meta: Vec<u8> = 1u32.to_le_bytes().to_vec();
        meta.extend_from_slice(&(object_path.len() as u32).to_le_bytes());
        meta.extend_from_slice(object_path.as_bytes());
        meta.extend_from_slice(&20u32.to_le_bytes());
        meta.extend_from_slice(&10u32.to_le_bytes()); // f64
        meta.extend_from_slice(&1u32.to_le_bytes());
        meta.extend_from_slice(&(values.len() as u64).to_le_bytes());
        meta.extend_from_slice(&0u32.to_le_bytes());

        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let mut bytes = b"TDSm".to_vec();
        bytes.extend_from_slice(&0b1110u32.to_le_bytes());
        bytes.extend_from_slice(&4713u32.to_le_bytes());
        bytes.extend_from_slice(&((meta.len() + raw.len()) as u64).to_le_bytes());
        bytes.extend_from_slice(&(meta.len() as u64).to_le_bytes());
        bytes.extend(meta);
        bytes.extend(raw);

        let path = dir.join(name);
        fs::File::create(&path).unwrap().write_all(&bytes).unwrap();
        path
    }

    #[test]
    fn test_directory_mode_merges_surviving_conversions() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("captures");
        fs::create_dir_all(&input).unwrap();
        write_capture(&input, "a.tdms", "ch", &[1.0, 2.0]);
        write_capture(&input, "b.tdms", "ch", &[3.0, 4.0, 5.0]);
        fs::write(input.join("broken.tdms"), b"not a capture").unwrap();

        let output_dir = temp_dir.path().join("out");
        fs::create_dir_all(&output_dir).unwrap();

        let config = PipelineConfig::default();
        let summary =
            process_directory(&input, &output_dir, true, None, "202401010000", &config).unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.failed, 1);

        let merged = summary.merged.expect("merge output should exist");
        assert!(merged.exists());
        let content = fs::read_to_string(&merged).unwrap();
        // header + 2 rows from a.tdms + 3 rows from b.tdms
        assert_eq!(content.lines().count(), 6);
        assert!(content.starts_with("CH0\n"));
    }

    #[test]
    fn test_file_mode_transform_creates_artifact_without_merge() {
        let temp_dir = TempDir::new().unwrap();
        let samples: Vec<f64> = (0..512)
            .map(|i| (2.0 * std::f64::consts::PI * 0.05 * i as f64).sin())
            .collect();
        let capture = write_capture(temp_dir.path(), "single.tdms", "ch1", &samples);

        let output_dir = temp_dir.path().join("out");
        fs::create_dir_all(&output_dir).unwrap();

        let request = TransformRequest {
            channels: vec!["rig/ch1".to_string()],
            algorithm: 2,
        };
        let config = PipelineConfig::default();
        let summary = process_file(&capture, &output_dir, Some(&request), &config).unwrap();

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.artifacts, 1);
        assert!(summary.merged.is_none());
        assert!(output_dir.join("single_rig_ch1_stft.png").exists());

        // No merge file is created in file mode
        let merge_files = fs::read_dir(&output_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("merge_csv_"))
            .count();
        assert_eq!(merge_files, 0);
    }

    #[test]
    fn test_file_mode_rejects_non_capture() {
        let temp_dir = TempDir::new().unwrap();
        let stray = temp_dir.path().join("notes.txt");
        fs::write(&stray, "hello").unwrap();

        let config = PipelineConfig::default();
        let result = process_file(&stray, temp_dir.path(), None, &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_directory_mode_without_merge_transforms_each_file() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("captures");
        fs::create_dir_all(&input).unwrap();
        let samples: Vec<f64> = (0..512)
            .map(|i| (2.0 * std::f64::consts::PI * 0.1 * i as f64).sin())
            .collect();
        write_capture(&input, "one.tdms", "ch", &samples);
        write_capture(&input, "two.tdms", "ch", &samples);

        let output_dir = temp_dir.path().join("out");
        fs::create_dir_all(&output_dir).unwrap();

        let request = TransformRequest {
            channels: vec!["rig/ch".to_string()],
            algorithm: 2,
        };
        let config = PipelineConfig::default();
        let summary = process_directory(
            &input,
            &output_dir,
            false,
            Some(&request),
            "ts",
            &config,
        )
        .unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.artifacts, 2);
        assert!(summary.merged.is_none());
        assert!(output_dir.join("one_rig_ch_stft.png").exists());
        assert!(output_dir.join("two_rig_ch_stft.png").exists());
    }
}
