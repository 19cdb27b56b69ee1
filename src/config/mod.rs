//! Configuration types for the conversion and transform pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the frame-based spectral transforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Analysis window length in samples (STFT and simplified S-transform)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Hop between consecutive analysis windows in samples
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,

    /// Largest wavelet width for the continuous wavelet transform
    #[serde(default = "default_cwt_max_width")]
    pub cwt_max_width: usize,

    /// Input length cap for the Wigner-Ville distribution
    #[serde(default = "default_wvd_max_samples")]
    pub wvd_max_samples: usize,
}

fn default_window_size() -> usize {
    256
}

fn default_hop_size() -> usize {
    128
}

fn default_cwt_max_width() -> usize {
    30
}

fn default_wvd_max_samples() -> usize {
    4096
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            hop_size: default_hop_size(),
            cwt_max_width: default_cwt_max_width(),
            wvd_max_samples: default_wvd_max_samples(),
        }
    }
}

/// Configuration for the mel-scaled power spectrogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelConfig {
    /// Sampling rate assumed for the capture data in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// FFT length in samples
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,

    /// Hop between consecutive FFT frames in samples
    #[serde(default = "default_mel_hop_size")]
    pub hop_size: usize,

    /// Number of mel bands
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,

    /// Upper frequency bound of the mel filterbank in Hz
    #[serde(default = "default_f_max")]
    pub f_max: f64,
}

fn default_sample_rate() -> f64 {
    22050.0
}

fn default_n_fft() -> usize {
    2048
}

fn default_mel_hop_size() -> usize {
    512
}

fn default_n_mels() -> usize {
    128
}

fn default_f_max() -> f64 {
    8000.0
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            n_fft: default_n_fft(),
            hop_size: default_mel_hop_size(),
            n_mels: default_n_mels(),
            f_max: default_f_max(),
        }
    }
}

/// Configuration for heatmap rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Image width in pixels
    #[serde(default = "default_plot_width")]
    pub width: u32,

    /// Image height in pixels
    #[serde(default = "default_plot_height")]
    pub height: u32,

    /// Maximum number of time bins drawn (subsamples if exceeded)
    #[serde(default = "default_max_time_bins")]
    pub max_time_bins: usize,
}

fn default_plot_width() -> u32 {
    1280
}

fn default_plot_height() -> u32 {
    720
}

fn default_max_time_bins() -> usize {
    768
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
            max_time_bins: default_max_time_bins(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub spectral: SpectralConfig,

    #[serde(default)]
    pub mel: MelConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spectral_config() {
        let config = SpectralConfig::default();
        assert_eq!(config.window_size, 256);
        assert_eq!(config.hop_size, 128);
        assert_eq!(config.cwt_max_width, 30);
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.mel.n_mels, 128);
        assert_eq!(config.mel.f_max, 8000.0);
        assert_eq!(config.plot.width, 1280);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "spectral:\n  window_size: 512\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.spectral.window_size, 512);
        assert_eq!(config.spectral.hop_size, 128);
        assert_eq!(config.mel.n_fft, 2048);
    }
}
