//! Time-frequency transform numerics.
//!
//! This module computes the spectral transforms behind the rendered heatmaps:
//! STFT magnitude, log-power spectrogram, mel-scaled spectrogram, continuous
//! wavelet transform and the Wigner-Ville distribution. Computation is kept
//! separate from rendering so results can be asserted on directly; the
//! quadratic transforms are parallelized using Rayon.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use thiserror::Error;

use crate::config::MelConfig;

/// Errors that can occur during transform computation.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("empty input signal")]
    EmptySignal,

    #[error("input too short: need at least {needed} samples, got {got}")]
    TooShort { needed: usize, got: usize },
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// A time-frequency matrix with its axis values.
///
/// `values` is row-major with rows ordered by ascending frequency (or wavelet
/// width) and one column per time bin.
#[derive(Debug, Clone)]
pub struct TimeFrequency {
    /// Transform values, shape [num_bins][num_frames]
    pub values: Vec<Vec<f64>>,
    /// Frequency (or scale) value for each row
    pub freqs: Vec<f64>,
    /// Time value for each column
    pub times: Vec<f64>,
}

impl TimeFrequency {
    /// Returns the number of frequency rows.
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.values.len()
    }

    /// Returns the number of time columns.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.values.first().map_or(0, |row| row.len())
    }
}

/// Hann window weights: w[n] = 0.5 - 0.5*cos(2*pi*n/N)
fn hann(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / len as f64).cos())
        .collect()
}

/// Compute Hann-windowed one-sided power spectra for each analysis frame.
///
/// Returns (frame-major power rows, frame center times in samples).
fn power_frames(
    samples: &[f64],
    window_size: usize,
    hop_size: usize,
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    debug_assert!(window_size > 0 && hop_size > 0, "invalid frame parameters");

    if samples.is_empty() {
        return Err(TransformError::EmptySignal);
    }
    if samples.len() < window_size {
        return Err(TransformError::TooShort {
            needed: window_size,
            got: samples.len(),
        });
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(window_size);
    let window = hann(window_size);

    let num_frames = (samples.len() - window_size) / hop_size + 1;
    let bins = window_size / 2 + 1;
    let scale = 1.0 / window_size as f64;

    let mut frames = Vec::with_capacity(num_frames);
    let mut times = Vec::with_capacity(num_frames);
    let mut buffer: Vec<Complex<f64>> = vec![Complex { re: 0.0, im: 0.0 }; window_size];

    for i in 0..num_frames {
        let start = i * hop_size;
        for (j, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex {
                re: samples[start + j] * window[j],
                im: 0.0,
            };
        }
        fft.process(&mut buffer);

        let row: Vec<f64> = buffer
            .iter()
            .take(bins)
            .map(|c| c.norm_sqr() * scale * scale)
            .collect();
        frames.push(row);
        times.push((start + window_size / 2) as f64);
    }

    Ok((frames, times))
}

/// Transpose frame-major rows into bin-major rows.
fn transpose(frames: &[Vec<f64>], bins: usize) -> Vec<Vec<f64>> {
    let mut rows = vec![vec![0.0; frames.len()]; bins];
    for (t, frame) in frames.iter().enumerate() {
        for (k, &value) in frame.iter().enumerate() {
            rows[k][t] = value;
        }
    }
    rows
}

/// Short-time Fourier magnitude spectrogram.
///
/// Hann-windowed one-sided magnitudes; frequencies are in cycles per sample
/// up to 0.5 (unit sampling rate).
pub fn stft_magnitude(samples: &[f64], window_size: usize, hop_size: usize) -> Result<TimeFrequency> {
    let (frames, times) = power_frames(samples, window_size, hop_size)?;
    let bins = window_size / 2 + 1;

    let mut values = transpose(&frames, bins);
    for row in &mut values {
        for value in row.iter_mut() {
            *value = value.sqrt();
        }
    }

    let freqs = (0..bins).map(|k| k as f64 / window_size as f64).collect();
    Ok(TimeFrequency { values, freqs, times })
}

/// Log-power spectrogram at unit sampling rate (simplified S-transform).
pub fn log_spectrogram(
    samples: &[f64],
    window_size: usize,
    hop_size: usize,
) -> Result<TimeFrequency> {
    let (frames, times) = power_frames(samples, window_size, hop_size)?;
    let bins = window_size / 2 + 1;

    let mut values = transpose(&frames, bins);
    for row in &mut values {
        for value in row.iter_mut() {
            *value = 10.0 * value.max(1e-12).log10();
        }
    }

    let freqs = (0..bins).map(|k| k as f64 / window_size as f64).collect();
    Ok(TimeFrequency { values, freqs, times })
}

/// Convert a frequency in Hz to the mel scale.
fn hz_to_mel(f: f64) -> f64 {
    2595.0 * (1.0 + f / 700.0).log10()
}

/// Convert a mel value back to Hz.
fn mel_to_hz(m: f64) -> f64 {
    700.0 * (10f64.powf(m / 2595.0) - 1.0)
}

/// Build a triangular mel filterbank over the one-sided FFT bins.
///
/// Returns (filter weights [n_mels][bins], band center frequencies in Hz).
fn mel_filterbank(config: &MelConfig) -> (Vec<Vec<f64>>, Vec<f64>) {
    let bins = config.n_fft / 2 + 1;
    let f_max = config.f_max.min(config.sample_rate / 2.0);

    let mel_max = hz_to_mel(f_max);
    let hz_points: Vec<f64> = (0..config.n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (config.n_mels + 1) as f64))
        .collect();

    let bin_width = config.sample_rate / config.n_fft as f64;
    let mut filters = vec![vec![0.0; bins]; config.n_mels];

    for (m, filter) in filters.iter_mut().enumerate() {
        let lower = hz_points[m];
        let center = hz_points[m + 1];
        let upper = hz_points[m + 2];

        for (k, weight) in filter.iter_mut().enumerate() {
            let f = k as f64 * bin_width;
            *weight = if f <= lower || f >= upper {
                0.0
            } else if f <= center {
                (f - lower) / (center - lower)
            } else {
                (upper - f) / (upper - center)
            };
        }
    }

    let centers = hz_points[1..=config.n_mels].to_vec();
    (filters, centers)
}

/// Mel-scaled power spectrogram in decibels.
///
/// Power is pooled into triangular mel bands, then converted to dB relative
/// to the peak and floored at -80 dB, so the strongest cell sits at 0 dB.
pub fn mel_spectrogram_db(samples: &[f64], config: &MelConfig) -> Result<TimeFrequency> {
    let (frames, sample_times) = power_frames(samples, config.n_fft, config.hop_size)?;
    let (filters, centers) = mel_filterbank(config);

    // Pool FFT bin power into mel bands, frame by frame
    let mel_frames: Vec<Vec<f64>> = frames
        .iter()
        .map(|frame| {
            filters
                .iter()
                .map(|filter| {
                    filter
                        .iter()
                        .zip(frame.iter())
                        .map(|(w, p)| w * p)
                        .sum::<f64>()
                })
                .collect()
        })
        .collect();

    let mut values = transpose(&mel_frames, config.n_mels);

    let reference = values
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |acc, &v| acc.max(v))
        .max(1e-12);
    for row in &mut values {
        for value in row.iter_mut() {
            *value = (10.0 * (*value / reference).max(1e-12).log10()).max(-80.0);
        }
    }

    let times = sample_times
        .iter()
        .map(|t| t / config.sample_rate)
        .collect();
    Ok(TimeFrequency {
        values,
        freqs: centers,
        times,
    })
}

/// Complex Morlet wavelet of `len` points at the given scale.
fn morlet(len: usize, scale: f64) -> Vec<Complex<f64>> {
    const OMEGA0: f64 = 5.0;
    let norm = std::f64::consts::PI.powf(-0.25) / scale.sqrt();

    (0..len)
        .map(|k| {
            let x = (k as f64 - (len as f64 - 1.0) / 2.0) / scale;
            let envelope = (-0.5 * x * x).exp() * norm;
            Complex {
                re: envelope * (OMEGA0 * x).cos(),
                im: envelope * (OMEGA0 * x).sin(),
            }
        })
        .collect()
}

/// Continuous wavelet transform magnitudes over integer widths 1..=max_width.
///
/// One row per width (small widths first), one column per input sample;
/// same-length convolution with a complex Morlet wavelet. Widths are
/// parallelized since each row is independent.
pub fn cwt_magnitude(samples: &[f64], max_width: usize) -> Result<TimeFrequency> {
    debug_assert!(max_width >= 1, "need at least one wavelet width");

    if samples.is_empty() {
        return Err(TransformError::EmptySignal);
    }

    let n = samples.len();
    let values: Vec<Vec<f64>> = (1..=max_width)
        .into_par_iter()
        .map(|width| {
            let len = (10 * width).min(n);
            let wavelet = morlet(len, width as f64);
            let center = len / 2;

            (0..n)
                .map(|i| {
                    let mut acc = Complex { re: 0.0, im: 0.0 };
                    for (k, psi) in wavelet.iter().enumerate() {
                        let j = i as isize + k as isize - center as isize;
                        if j >= 0 && (j as usize) < n {
                            acc += psi.conj() * samples[j as usize];
                        }
                    }
                    acc.norm()
                })
                .collect()
        })
        .collect();

    let freqs = (1..=max_width).map(|w| w as f64).collect();
    let times = (0..n).map(|t| t as f64).collect();
    Ok(TimeFrequency { values, freqs, times })
}

/// Discrete Wigner-Ville time-frequency energy distribution.
///
/// For each time index the instantaneous autocorrelation over lag is Fourier
/// transformed; the absolute value of the result is returned. The input is
/// truncated to `max_samples` because the distribution is quadratic in input
/// length. Time columns are parallelized.
pub fn wigner_ville(samples: &[f64], max_samples: usize) -> Result<TimeFrequency> {
    if samples.is_empty() {
        return Err(TransformError::EmptySignal);
    }

    let n = samples.len().min(max_samples);
    if n < 2 {
        return Err(TransformError::TooShort { needed: 2, got: n });
    }
    let samples = &samples[..n];

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let bins = n / 2 + 1;

    let columns: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|t| {
            let mut kernel = vec![Complex { re: 0.0, im: 0.0 }; n];
            let tau_max = t.min(n - 1 - t);

            kernel[0] = Complex {
                re: samples[t] * samples[t],
                im: 0.0,
            };
            for tau in 1..=tau_max {
                let r = samples[t + tau] * samples[t - tau];
                kernel[tau] = Complex { re: r, im: 0.0 };
                kernel[n - tau] = Complex { re: r, im: 0.0 };
            }

            fft.process(&mut kernel);
            kernel.iter().take(bins).map(|c| c.re.abs()).collect()
        })
        .collect();

    let mut values = vec![vec![0.0; n]; bins];
    for (t, column) in columns.iter().enumerate() {
        for (k, &value) in column.iter().enumerate() {
            values[k][t] = value;
        }
    }

    // Lag doubling halves the effective frequency axis
    let freqs = (0..bins).map(|k| 0.5 * k as f64 / n as f64).collect();
    let times = (0..n).map(|t| t as f64).collect();
    Ok(TimeFrequency { values, freqs, times })
}
