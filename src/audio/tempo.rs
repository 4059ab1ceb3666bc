//! Tempo estimation from beat timestamps

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Tempo estimation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TempoConfig {
    /// Beat timestamps kept
    pub history_size: usize,

    /// Beats needed before the estimate moves off its seed
    pub min_beats: usize,

    /// Estimate reported until enough beats arrive
    pub default_bpm: f32,

    /// Weight of each new sample in the exponential smoothing
    pub smoothing: f32,

    /// Samples outside [min_bpm, max_bpm] are folded by octaves into range
    pub min_bpm: f32,
    pub max_bpm: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            history_size: 20,
            min_beats: 4,
            default_bpm: 120.0,
            smoothing: 0.2,
            min_bpm: 60.0,
            max_bpm: 200.0,
        }
    }
}

/// Current tempo and rhythm shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmEstimate {
    pub bpm: f32,
    /// 1 - coefficient of variation of the inter-beat intervals (0-1)
    pub regularity: f32,
    /// Scaled coefficient of variation (0-1)
    pub complexity: f32,
}

/// Smoothed BPM estimator over a rolling window of beat timestamps
pub struct TempoEstimator {
    config: TempoConfig,
    beats: VecDeque<Duration>,
    bpm: f32,
    regularity: f32,
    complexity: f32,
}

impl TempoEstimator {
    pub fn new(config: &TempoConfig) -> Self {
        let mut config = config.clone();
        config.history_size = config.history_size.max(2);
        config.min_beats = config.min_beats.max(2);
        config.smoothing = config.smoothing.clamp(0.0, 1.0);
        if config.min_bpm <= 0.0 || config.max_bpm < config.min_bpm * 2.0 {
            let defaults = TempoConfig::default();
            config.min_bpm = defaults.min_bpm;
            config.max_bpm = defaults.max_bpm;
        }

        Self {
            beats: VecDeque::with_capacity(config.history_size + 1),
            bpm: config.default_bpm,
            regularity: 0.0,
            complexity: 0.0,
            config,
        }
    }

    /// Record a beat and return the smoothed BPM.
    ///
    /// Until `min_beats` beats are known the previous estimate is returned
    /// unchanged. After that, the median inter-beat interval gives a sample
    /// that is blended in as `old * (1 - s) + sample * s`.
    pub fn update(&mut self, beat: Duration) -> f32 {
        self.beats.push_back(beat);
        if self.beats.len() > self.config.history_size {
            self.beats.pop_front();
        }

        if self.beats.len() < self.config.min_beats {
            return self.bpm;
        }

        let intervals: Vec<f32> = self
            .beats
            .iter()
            .zip(self.beats.iter().skip(1))
            .filter_map(|(a, b)| b.checked_sub(*a))
            .map(|d| d.as_secs_f32())
            .filter(|secs| *secs > 0.0)
            .collect();

        let Some(interval) = median(&intervals) else {
            return self.bpm;
        };

        if let Some(sample) = self.fold_into_range(60.0 / interval) {
            let s = self.config.smoothing;
            self.bpm = self.bpm * (1.0 - s) + sample * s;
        }

        let mean = intervals.iter().sum::<f32>() / intervals.len() as f32;
        let variance =
            intervals.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / intervals.len() as f32;
        let cv = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };
        self.regularity = (1.0 - cv).clamp(0.0, 1.0);
        self.complexity = (cv * 2.0).clamp(0.0, 1.0);

        self.bpm
    }

    /// Seed the estimate from an external tempo source (e.g. track metadata).
    ///
    /// Only applies while the estimator is still cold; once enough beats
    /// have been heard the measured tempo wins.
    pub fn apply_hint(&mut self, bpm: f32) {
        if self.beats.len() >= self.config.min_beats {
            return;
        }
        if let Some(bpm) = self.fold_into_range(bpm) {
            log::debug!("Seeding tempo estimate from hint: {:.1} BPM", bpm);
            self.bpm = bpm;
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn estimate(&self) -> RhythmEstimate {
        RhythmEstimate {
            bpm: self.bpm,
            regularity: self.regularity,
            complexity: self.complexity,
        }
    }

    pub fn beat_count(&self) -> usize {
        self.beats.len()
    }

    pub fn reset(&mut self) {
        self.beats.clear();
        self.bpm = self.config.default_bpm;
        self.regularity = 0.0;
        self.complexity = 0.0;
    }

    /// Halve or double until the tempo lands in the plausible range
    fn fold_into_range(&self, bpm: f32) -> Option<f32> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return None;
        }
        let mut bpm = bpm;
        while bpm < self.config.min_bpm {
            bpm *= 2.0;
        }
        while bpm > self.config.max_bpm {
            bpm /= 2.0;
        }
        Some(bpm)
    }
}

fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}
