//! Heatmap rendering for time-frequency data.
//!
//! This module renders a [`TimeFrequency`] matrix as a PNG heatmap using the
//! plotters library. Plots are drawn without text labels so no fonts are
//! required at runtime.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::PlotConfig;
use crate::core::transforms::TimeFrequency;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty time-frequency map")]
    EmptyMap,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Color gradient anchors from low to high intensity (dark to bright).
const HEAT_GRADIENT: &[(f64, (u8, u8, u8))] = &[
    (0.00, (0, 0, 4)),
    (0.25, (81, 18, 124)),
    (0.50, (183, 55, 121)),
    (0.75, (252, 137, 97)),
    (1.00, (252, 253, 191)),
];

/// Map a normalized value in [0, 1] onto the heat gradient.
fn heat_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);

    for pair in HEAT_GRADIENT.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let frac = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
            let lerp = |a: u8, b: u8| (a as f64 + frac * (b as f64 - a as f64)).round() as u8;
            return RGBColor(lerp(c0.0, c1.0), lerp(c0.1, c1.1), lerp(c0.2, c1.2));
        }
    }

    let (_, last) = HEAT_GRADIENT[HEAT_GRADIENT.len() - 1];
    RGBColor(last.0, last.1, last.2)
}

/// Finite minimum and maximum over the matrix, ignoring NaN cells.
fn value_range(tf: &TimeFrequency) -> (f64, f64) {
    let mut min = f64::MAX;
    let mut max = f64::MIN;

    for value in tf.values.iter().flatten() {
        if value.is_finite() {
            if *value < min {
                min = *value;
            }
            if *value > max {
                max = *value;
            }
        }
    }

    if min > max {
        // No finite cell at all
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 0.5, max + 0.5);
    }
    (min, max)
}

/// Render a time-frequency matrix as a PNG heatmap.
///
/// Cells are drawn as filled rectangles with low frequencies at the bottom.
/// When the matrix has more time columns than `config.max_time_bins`, columns
/// are subsampled with a fixed stride.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `tf` - Time-frequency matrix to render
/// * `config` - Image dimensions and subsampling cap
pub fn plot_heatmap(output_path: &Path, tf: &TimeFrequency, config: &PlotConfig) -> Result<()> {
    let num_bins = tf.num_bins();
    let num_frames = tf.num_frames();
    if num_bins == 0 || num_frames == 0 {
        return Err(VisualizationError::EmptyMap);
    }

    // Subsample time columns above the configured cap
    let step = if num_frames > config.max_time_bins {
        num_frames / config.max_time_bins
    } else {
        1
    };
    let columns: Vec<usize> = (0..num_frames).step_by(step).collect();

    let (min, max) = value_range(tf);
    let span = max - min;

    let root =
        BitMapBackend::new(output_path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(0f64..columns.len() as f64, 0f64..num_bins as f64)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series((0..num_bins).flat_map(|bin| {
            let tf_row = &tf.values[bin];
            columns.iter().enumerate().map(move |(x, &frame)| {
                let value = tf_row[frame];
                let t = if value.is_finite() { (value - min) / span } else { 0.0 };
                Rectangle::new(
                    [
                        (x as f64, bin as f64),
                        ((x + 1) as f64, (bin + 1) as f64),
                    ],
                    heat_color(t).filled(),
                )
            })
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ramp_map(bins: usize, frames: usize) -> TimeFrequency {
        TimeFrequency {
            values: (0..bins)
                .map(|b| (0..frames).map(|f| (b * frames + f) as f64).collect())
                .collect(),
            freqs: (0..bins).map(|b| b as f64).collect(),
            times: (0..frames).map(|f| f as f64).collect(),
        }
    }

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(0, 0, 4));
        assert_eq!(heat_color(1.0), RGBColor(252, 253, 191));
        // Out-of-range values clamp
        assert_eq!(heat_color(-1.0), RGBColor(0, 0, 4));
        assert_eq!(heat_color(2.0), RGBColor(252, 253, 191));
    }

    #[test]
    fn test_value_range_ignores_nan() {
        let mut tf = ramp_map(2, 3);
        tf.values[0][0] = f64::NAN;
        let (min, max) = value_range(&tf);
        assert_eq!(min, 1.0);
        assert_eq!(max, 5.0);
    }

    #[test]
    fn test_value_range_constant_map() {
        let tf = TimeFrequency {
            values: vec![vec![2.0; 4]; 2],
            freqs: vec![0.0, 1.0],
            times: vec![0.0, 1.0, 2.0, 3.0],
        };
        let (min, max) = value_range(&tf);
        assert!(min < 2.0 && max > 2.0);
    }

    #[test]
    fn test_plot_heatmap_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.png");

        plot_heatmap(&path, &ramp_map(16, 32), &PlotConfig::default()).unwrap();

        assert!(path.exists());
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_plot_heatmap_empty_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");
        let tf = TimeFrequency {
            values: Vec::new(),
            freqs: Vec::new(),
            times: Vec::new(),
        };

        assert!(matches!(
            plot_heatmap(&path, &tf, &PlotConfig::default()),
            Err(VisualizationError::EmptyMap)
        ));
        assert!(!path.exists());
    }
}
