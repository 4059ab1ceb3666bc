//! Spectral analysis of a single frame

use super::{AudioConfig, AudioFrame, PartialAnalysis};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fraction of total magnitude below the rolloff frequency
const ROLLOFF_FRACTION: f32 = 0.85;

/// Magnitude sum under which a spectrum counts as silent
const SILENCE_EPSILON: f32 = 1e-9;

/// Analysis errors
#[derive(Error, Debug, PartialEq)]
pub enum AnalysisError {
    #[error("Frame has {actual} samples, analyzer expects {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("FFT size {0} is not a power of two")]
    InvalidFftSize(usize),

    #[error("Band count {bands} does not fit a {bins}-bin half spectrum")]
    InvalidBandCount { bands: usize, bins: usize },
}

/// Everything derived from one frame's samples and spectrum
#[derive(Debug, Clone, Default)]
pub struct SpectralFeatures {
    /// RMS of the unwindowed samples
    pub volume: f32,

    /// Average normalized magnitude per equal-width band
    pub bands: Vec<f32>,

    /// Magnitude-weighted mean bin index
    pub centroid_bin: f32,

    /// Centroid converted to Hz
    pub centroid_hz: f32,

    /// Frequency below which 85% of the magnitude lies
    pub rolloff_hz: f32,

    /// Positive change of the normalized spectrum since the previous frame
    pub flux: f32,

    /// Spread around the centroid as a fraction of the half spectrum
    pub bandwidth: f32,

    /// (loudest band - quietest band) / (loudest + quietest)
    pub contrast: f32,

    /// Geometric over arithmetic mean of the power spectrum
    pub flatness: f32,

    /// Fraction of adjacent samples that change sign
    pub zero_crossing_rate: f32,

    /// Index of the loudest band
    pub dominant_band: usize,

    /// Stream position of the analyzed frame
    pub timestamp: Duration,
}

impl SpectralFeatures {
    /// Convert into a partial result for the aggregator
    pub fn to_partial(&self) -> PartialAnalysis {
        PartialAnalysis {
            volume: Some(self.volume),
            bands: Some(self.bands.clone()),
            spectral_centroid: Some(self.centroid_hz),
            spectral_rolloff: Some(self.rolloff_hz),
            spectral_flux: Some(self.flux),
            spectral_bandwidth: Some(self.bandwidth),
            spectral_contrast: Some(self.contrast),
            spectral_flatness: Some(self.flatness),
            zero_crossing_rate: Some(self.zero_crossing_rate),
            timestamp: Some(self.timestamp),
            ..Default::default()
        }
    }
}

/// Windowed FFT analyzer for fixed-size frames
pub struct SpectralAnalyzer {
    fft_size: usize,
    band_count: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// 2 / sum(window): scales a full-scale sine peak to ~1.0
    magnitude_scale: f32,
    buffer: Vec<Complex<f32>>,
    prev_spectrum: Vec<f32>,
}

impl SpectralAnalyzer {
    /// Create a new analyzer for the configured FFT size and band count
    pub fn new(config: &AudioConfig) -> Result<Self, AnalysisError> {
        let fft_size = config.fft_size;
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidFftSize(fft_size));
        }

        let bins = fft_size / 2;
        if config.band_count == 0 || config.band_count > bins {
            return Err(AnalysisError::InvalidBandCount {
                bands: config.band_count,
                bins,
            });
        }

        // Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();
        let window_sum: f32 = window.iter().sum();

        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            band_count: config.band_count,
            fft,
            window,
            magnitude_scale: 2.0 / window_sum,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            prev_spectrum: vec![0.0; bins],
        })
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Analyze one frame.
    ///
    /// The frame must hold exactly `fft_size` samples; anything else is
    /// rejected so the caller can log and skip it.
    pub fn analyze(&mut self, frame: &AudioFrame) -> Result<SpectralFeatures, AnalysisError> {
        let samples = frame.samples();
        if samples.len() != self.fft_size {
            return Err(AnalysisError::FrameSizeMismatch {
                expected: self.fft_size,
                actual: samples.len(),
            });
        }

        let volume = rms(samples);
        let zero_crossing_rate = zero_crossing_rate(samples);

        for ((slot, &s), &w) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let bins = self.fft_size / 2;
        let magnitudes: Vec<f32> = self
            .buffer
            .iter()
            .take(bins)
            .map(|c| c.norm() * self.magnitude_scale)
            .collect();

        let bands = self.band_energies(&magnitudes);
        let bin_hz = frame.sample_rate() as f32 / self.fft_size as f32;
        let total: f32 = magnitudes.iter().sum();

        let mut features = SpectralFeatures {
            volume,
            zero_crossing_rate,
            timestamp: frame.timestamp(),
            ..Default::default()
        };

        if total > SILENCE_EPSILON {
            let centroid_bin = magnitudes
                .iter()
                .enumerate()
                .map(|(k, &m)| k as f32 * m)
                .sum::<f32>()
                / total;

            let spread = magnitudes
                .iter()
                .enumerate()
                .map(|(k, &m)| {
                    let d = k as f32 - centroid_bin;
                    m * d * d
                })
                .sum::<f32>()
                / total;

            let mut cumulative = 0.0;
            let mut rolloff_bin = bins - 1;
            for (k, &m) in magnitudes.iter().enumerate() {
                cumulative += m;
                if cumulative >= ROLLOFF_FRACTION * total {
                    rolloff_bin = k;
                    break;
                }
            }

            features.centroid_bin = centroid_bin;
            features.centroid_hz = centroid_bin * bin_hz;
            features.rolloff_hz = rolloff_bin as f32 * bin_hz;
            features.bandwidth = (spread.sqrt() / bins as f32).min(1.0);
            features.flatness = flatness(&magnitudes);
            features.contrast = contrast(&bands);
            features.dominant_band = bands
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
        }

        // Flux compares magnitude distributions, so loudness alone does not register.
        let normalized: Vec<f32> = if total > SILENCE_EPSILON {
            magnitudes.iter().map(|m| m / total).collect()
        } else {
            vec![0.0; bins]
        };
        features.flux = normalized
            .iter()
            .zip(&self.prev_spectrum)
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
        self.prev_spectrum = normalized;

        features.bands = bands;
        Ok(features)
    }

    /// Average magnitude per equal-width band over [0, N/2)
    fn band_energies(&self, magnitudes: &[f32]) -> Vec<f32> {
        let bins = magnitudes.len();
        (0..self.band_count)
            .map(|b| {
                let start = b * bins / self.band_count;
                let end = ((b + 1) * bins / self.band_count).max(start + 1);
                let slice = &magnitudes[start..end.min(bins)];
                slice.iter().sum::<f32>() / slice.len() as f32
            })
            .collect()
    }

    /// Forget the previous spectrum so the next flux starts from silence
    pub fn reset(&mut self) {
        self.prev_spectrum.iter_mut().for_each(|v| *v = 0.0);
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

fn flatness(magnitudes: &[f32]) -> f32 {
    let n = magnitudes.len() as f32;
    let power: Vec<f32> = magnitudes.iter().map(|m| m * m + 1e-12).collect();
    let arithmetic = power.iter().sum::<f32>() / n;
    let geometric = (power.iter().map(|p| p.ln()).sum::<f32>() / n).exp();
    if arithmetic > 0.0 {
        (geometric / arithmetic).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn contrast(bands: &[f32]) -> f32 {
    let max = bands.iter().cloned().fold(0.0f32, f32::max);
    let min = bands.iter().cloned().fold(f32::INFINITY, f32::min);
    if max + min > SILENCE_EPSILON {
        ((max - min) / (max + min)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
