//! Analysis result types shared by the analysis path and the effect engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Coarse mood derived from the valence/arousal quadrant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Excited,
    Angry,
    Calm,
    Sad,
}

/// Coarse genre guess from tempo, timbre and rhythm heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    #[default]
    Unknown,
    Electronic,
    Rock,
    HipHop,
    Classical,
    Jazz,
    Ambient,
    Pop,
}

/// Merged result of one analyzed frame (Send-safe, cheap to share via `Arc`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// RMS volume (0-1)
    pub volume: f32,

    /// Per-band average magnitude, lowest band first
    pub bands: Vec<f32>,

    /// Spectral centroid in Hz
    pub spectral_centroid: f32,

    /// 85% rolloff frequency in Hz
    pub spectral_rolloff: f32,

    /// Spectral flux (0-1)
    pub spectral_flux: f32,

    /// Spectral bandwidth as a fraction of the half spectrum (0-1)
    pub spectral_bandwidth: f32,

    /// Band contrast (0-1)
    pub spectral_contrast: f32,

    /// Spectral flatness (0-1, 1 = noise)
    pub spectral_flatness: f32,

    /// Zero-crossing rate (0-1)
    pub zero_crossing_rate: f32,

    /// Index of the loudest band
    pub dominant_band: usize,

    /// Beat detected on this frame
    pub beat_detected: bool,

    /// Beat intensity (0-1)
    pub beat_intensity: f32,

    /// Estimated tempo
    pub bpm: f32,

    /// How steady recent inter-beat intervals are (0-1)
    pub rhythm_regularity: f32,

    /// How irregular recent inter-beat intervals are (0-1)
    pub rhythm_complexity: f32,

    /// Loudness proxy (0-1)
    pub energy: f32,

    /// Positivity proxy (-1 to 1)
    pub valence: f32,

    /// Excitement proxy (0-1)
    pub arousal: f32,

    /// min(volume * 100 + energy * 50, 1)
    pub intensity: f32,

    /// Mean of bandwidth, contrast and rhythm complexity
    pub complexity: f32,

    pub mood: Mood,

    pub genre: Genre,

    /// Stream position of the newest contributing frame
    pub timestamp: Duration,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            volume: 0.0,
            bands: Vec::new(),
            spectral_centroid: 0.0,
            spectral_rolloff: 0.0,
            spectral_flux: 0.0,
            spectral_bandwidth: 0.0,
            spectral_contrast: 0.0,
            spectral_flatness: 0.0,
            zero_crossing_rate: 0.0,
            dominant_band: 0,
            beat_detected: false,
            beat_intensity: 0.0,
            bpm: 120.0,
            rhythm_regularity: 0.0,
            rhythm_complexity: 0.0,
            energy: 0.0,
            valence: 0.0,
            arousal: 0.0,
            intensity: 0.0,
            complexity: 0.0,
            mood: Mood::Neutral,
            genre: Genre::Unknown,
            timestamp: Duration::ZERO,
        }
    }
}

impl AnalysisResult {
    /// Mean of the lowest, middle and highest thirds of the bands
    pub fn low_mid_high(&self) -> (f32, f32, f32) {
        let n = self.bands.len();
        if n == 0 {
            return (0.0, 0.0, 0.0);
        }
        let third = (n / 3).max(1);
        let mean = |slice: &[f32]| {
            if slice.is_empty() {
                0.0
            } else {
                slice.iter().sum::<f32>() / slice.len() as f32
            }
        };
        let low_end = third.min(n);
        let mid_end = (2 * third).min(n);
        (
            mean(&self.bands[..low_end]),
            mean(&self.bands[low_end..mid_end]),
            mean(&self.bands[mid_end..]),
        )
    }
}

/// Output of one sub-analysis.
///
/// `None` means the sub-analysis does not produce that field. When merged,
/// only present, non-default values (non-zero, non-empty) replace what the
/// aggregate already holds.
#[derive(Debug, Clone, Default)]
pub struct PartialAnalysis {
    pub volume: Option<f32>,
    pub bands: Option<Vec<f32>>,
    pub spectral_centroid: Option<f32>,
    pub spectral_rolloff: Option<f32>,
    pub spectral_flux: Option<f32>,
    pub spectral_bandwidth: Option<f32>,
    pub spectral_contrast: Option<f32>,
    pub spectral_flatness: Option<f32>,
    pub zero_crossing_rate: Option<f32>,
    pub beat_detected: Option<bool>,
    pub beat_intensity: Option<f32>,
    pub bpm: Option<f32>,
    pub rhythm_regularity: Option<f32>,
    pub rhythm_complexity: Option<f32>,
    pub timestamp: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_result_is_neutral_at_default_tempo() {
        let result = AnalysisResult::default();

        assert_eq!(result.volume, 0.0);
        assert!(result.bands.is_empty());
        assert!(!result.beat_detected);
        assert_eq!(result.bpm, 120.0);
        assert_eq!(result.mood, Mood::Neutral);
        assert_eq!(result.genre, Genre::Unknown);
    }

    #[test]
    fn low_mid_high_splits_bands_in_thirds() {
        let result = AnalysisResult {
            bands: vec![3.0, 3.0, 3.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0],
            ..Default::default()
        };

        let (low, mid, high) = result.low_mid_high();

        assert_eq!((low, mid, high), (3.0, 2.0, 1.0));
    }

    #[test]
    fn low_mid_high_handles_few_bands() {
        let result = AnalysisResult {
            bands: vec![0.5, 0.25],
            ..Default::default()
        };

        let (low, mid, high) = result.low_mid_high();

        assert_eq!(low, 0.5);
        assert_eq!(mid, 0.25);
        assert_eq!(high, 0.0);
    }
}
