//! Transform algorithm selection and per-channel dispatch.
//!
//! Maps integer algorithm selectors onto the supported transform routines and
//! runs the selected routine for each requested channel of a tabular file,
//! rendering one heatmap image per channel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::{self, ChannelTable};
use crate::core::transforms::{self, TimeFrequency};
use crate::visualization;

/// Errors specific to transform dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("channel '{channel}' not found in {path}")]
    MissingChannel { channel: String, path: PathBuf },
}

/// The supported transform routines.
///
/// Selector ids beyond the mapped ones are accepted by the CLI range but
/// resolve to `None`, which the dispatcher treats as a logged no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Mel-scaled log-power spectrogram
    MelSpectrogram,
    /// Short-time Fourier magnitude spectrogram
    Stft,
    /// Continuous wavelet transform magnitude map
    Cwt,
    /// Wigner-Ville time-frequency energy distribution
    WignerVille,
    /// Log-power spectrogram at unit sampling rate
    SimplifiedSTransform,
}

impl Algorithm {
    /// Highest selector id accepted by the CLI.
    pub const SELECTOR_MAX: u32 = 27;

    /// Resolve an integer selector to a routine, `None` when unmapped.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Algorithm::MelSpectrogram),
            2 => Some(Algorithm::Stft),
            3 => Some(Algorithm::Cwt),
            4 => Some(Algorithm::WignerVille),
            5 => Some(Algorithm::SimplifiedSTransform),
            _ => None,
        }
    }

    /// File name tag for artifacts produced by this routine.
    pub fn tag(self) -> &'static str {
        match self {
            Algorithm::MelSpectrogram => "mel_spectrogram",
            Algorithm::Stft => "stft",
            Algorithm::Cwt => "cwt",
            Algorithm::WignerVille => "wvd",
            Algorithm::SimplifiedSTransform => "s_transform",
        }
    }

    /// Human-readable routine name for progress lines.
    pub fn label(self) -> &'static str {
        match self {
            Algorithm::MelSpectrogram => "Mel Spectrogram",
            Algorithm::Stft => "STFT",
            Algorithm::Cwt => "CWT",
            Algorithm::WignerVille => "Wigner-Ville Distribution",
            Algorithm::SimplifiedSTransform => "S-Transform (simplified)",
        }
    }
}

/// Artifact path for a channel/algorithm pair, beside the tabular file.
///
/// `data/run1.csv` with channel `CH1` and STFT becomes
/// `data/run1_CH1_stft.png`. Path separators in decoder-supplied channel
/// names (`group/channel`) are flattened so the artifact stays a sibling of
/// its source file.
pub fn artifact_path(tabular: &Path, channel: &str, algorithm: Algorithm) -> PathBuf {
    let stem = tabular
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let channel = channel.replace(['/', '\\'], "_");
    tabular.with_file_name(format!("{}_{}_{}.png", stem, channel, algorithm.tag()))
}

/// Run the selected routine on one channel's samples.
fn compute(
    algorithm: Algorithm,
    samples: &[f64],
    config: &PipelineConfig,
) -> transforms::Result<TimeFrequency> {
    let spectral = &config.spectral;
    match algorithm {
        Algorithm::MelSpectrogram => transforms::mel_spectrogram_db(samples, &config.mel),
        Algorithm::Stft => {
            transforms::stft_magnitude(samples, spectral.window_size, spectral.hop_size)
        }
        Algorithm::Cwt => transforms::cwt_magnitude(samples, spectral.cwt_max_width),
        Algorithm::WignerVille => transforms::wigner_ville(samples, spectral.wvd_max_samples),
        Algorithm::SimplifiedSTransform => {
            transforms::log_spectrogram(samples, spectral.window_size, spectral.hop_size)
        }
    }
}

/// Extract the named channel from a loaded table.
fn channel_samples<'a>(
    table: &'a ChannelTable,
    channel: &str,
    tabular: &Path,
) -> Result<&'a [f64]> {
    table.channel(channel).ok_or_else(|| {
        DispatchError::MissingChannel {
            channel: channel.to_string(),
            path: tabular.to_path_buf(),
        }
        .into()
    })
}

/// Apply the selected transform to each requested channel of a tabular file.
///
/// Channels are processed sequentially in list order; a missing channel or a
/// failed transform aborts the remaining channels of this invocation. An
/// unmapped algorithm id logs a not-implemented notice per channel and
/// returns without writing anything.
///
/// # Returns
///
/// The paths of the rendered heatmap images, one per channel.
pub fn dispatch_transforms(
    tabular: &Path,
    channels: &[String],
    algorithm_id: u32,
    config: &PipelineConfig,
) -> Result<Vec<PathBuf>> {
    let algorithm = match Algorithm::from_id(algorithm_id) {
        Some(algorithm) => algorithm,
        None => {
            for channel in channels {
                warn!(
                    "Algorithm {} not implemented for {}",
                    algorithm_id, channel
                );
            }
            return Ok(Vec::new());
        }
    };

    let table = loaders::load_table_csv(tabular)
        .with_context(|| format!("Failed to read tabular file: {}", tabular.display()))?;

    let mut artifacts = Vec::with_capacity(channels.len());
    for channel in channels {
        let samples = channel_samples(&table, channel, tabular)?;
        let tf = compute(algorithm, samples, config).with_context(|| {
            format!("{} failed for channel {}", algorithm.label(), channel)
        })?;

        let output = artifact_path(tabular, channel, algorithm);
        visualization::plot_heatmap(&output, &tf, &config.plot)
            .with_context(|| format!("Failed to render {}", output.display()))?;

        println!(
            "{} transformation completed for {}. Image saved to {}",
            algorithm.label(),
            channel,
            output.display()
        );
        artifacts.push(output);
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_signal_csv(dir: &Path, name: &str, rows: usize) -> PathBuf {
        let mut content = String::from("CH0,CH1\n");
        for i in 0..rows {
            let phase = 2.0 * std::f64::consts::PI * 0.05 * i as f64;
            content.push_str(&format!("{},{}\n", phase.sin(), phase.cos()));
        }
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_from_id_mapping() {
        assert_eq!(Algorithm::from_id(1), Some(Algorithm::MelSpectrogram));
        assert_eq!(Algorithm::from_id(2), Some(Algorithm::Stft));
        assert_eq!(Algorithm::from_id(3), Some(Algorithm::Cwt));
        assert_eq!(Algorithm::from_id(4), Some(Algorithm::WignerVille));
        assert_eq!(Algorithm::from_id(5), Some(Algorithm::SimplifiedSTransform));
        assert_eq!(Algorithm::from_id(6), None);
        assert_eq!(Algorithm::from_id(27), None);
    }

    #[test]
    fn test_artifact_path_naming() {
        let path = artifact_path(Path::new("data/run1.csv"), "CH1", Algorithm::Stft);
        assert_eq!(path, Path::new("data/run1_CH1_stft.png"));

        // Separators in decoder-supplied channel names are flattened
        let path = artifact_path(Path::new("m.csv"), "rig/ch1", Algorithm::WignerVille);
        assert_eq!(path, Path::new("m_rig_ch1_wvd.png"));
    }

    #[test]
    fn test_dispatch_stft_creates_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let tabular = write_signal_csv(temp_dir.path(), "run.csv", 512);

        let config = PipelineConfig::default();
        let artifacts =
            dispatch_transforms(&tabular, &["CH1".to_string()], 2, &config).unwrap();

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name().unwrap(), "run_CH1_stft.png");
        assert!(artifacts[0].exists());
    }

    #[test]
    fn test_dispatch_unmapped_algorithm_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let tabular = write_signal_csv(temp_dir.path(), "run.csv", 64);

        let config = PipelineConfig::default();
        let artifacts = dispatch_transforms(
            &tabular,
            &["CH0".to_string(), "CH1".to_string()],
            9,
            &config,
        )
        .unwrap();

        assert!(artifacts.is_empty());
        let pngs = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "png").unwrap_or(false))
            .count();
        assert_eq!(pngs, 0);
    }

    #[test]
    fn test_dispatch_missing_channel_fails() {
        let temp_dir = TempDir::new().unwrap();
        let tabular = write_signal_csv(temp_dir.path(), "run.csv", 512);

        let config = PipelineConfig::default();
        let result = dispatch_transforms(&tabular, &["CH7".to_string()], 2, &config);

        let err = result.unwrap_err();
        assert!(err.to_string().contains("CH7"));
    }

    #[test]
    fn test_dispatch_channel_order_stops_at_failure() {
        let temp_dir = TempDir::new().unwrap();
        let tabular = write_signal_csv(temp_dir.path(), "run.csv", 512);

        let config = PipelineConfig::default();
        let channels = vec!["CH0".to_string(), "missing".to_string(), "CH1".to_string()];
        let result = dispatch_transforms(&tabular, &channels, 2, &config);

        assert!(result.is_err());
        // The first channel completed before the failure, the third never ran
        assert!(temp_dir.path().join("run_CH0_stft.png").exists());
        assert!(!temp_dir.path().join("run_CH1_stft.png").exists());
    }
}
