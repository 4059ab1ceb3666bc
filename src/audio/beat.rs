//! Volume-based beat detection with an adaptive average and refractory period

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

const THRESHOLD_RANGE: (f32, f32) = (0.0, 1.0);
const SENSITIVITY_RANGE: (f32, f32) = (0.0, 5.0);

/// Beat detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BeatConfig {
    /// Volume samples kept for the rolling average (~1s of frames)
    pub history_size: usize,

    /// Absolute volume a beat must exceed
    pub threshold: f32,

    /// Required rise over the rolling average, as a fraction of it
    pub sensitivity: f32,

    /// Minimum time between two beats
    pub refractory_ms: u64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            history_size: 43,
            threshold: 0.05,
            sensitivity: 0.3,
            refractory_ms: 200,
        }
    }
}

/// Per-frame beat decision
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BeatDecision {
    pub detected: bool,
    /// How far volume rose above the average (0-1); zero when no beat
    pub intensity: f32,
}

/// Beat detector over a rolling volume history
pub struct BeatDetector {
    history: VecDeque<f32>,
    capacity: usize,
    average: f32,
    last_beat: Option<Duration>,
    threshold: f32,
    sensitivity: f32,
    refractory: Duration,
}

impl BeatDetector {
    pub fn new(config: &BeatConfig) -> Self {
        let capacity = config.history_size.max(1);
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            average: 0.0,
            last_beat: None,
            threshold: config.threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1),
            sensitivity: config.sensitivity.clamp(SENSITIVITY_RANGE.0, SENSITIVITY_RANGE.1),
            refractory: Duration::from_millis(config.refractory_ms),
        }
    }

    /// Feed the volume of the frame at stream position `at`.
    ///
    /// A beat needs the volume above the absolute threshold, above
    /// `average * (1 + sensitivity)` of the preceding history, and the
    /// refractory period elapsed since the previous beat.
    pub fn detect(&mut self, volume: f32, at: Duration) -> BeatDecision {
        let volume = if volume.is_finite() { volume.max(0.0) } else { 0.0 };
        let average = self.average;

        let refractory_over = match self.last_beat {
            Some(last) => at
                .checked_sub(last)
                .map(|elapsed| elapsed >= self.refractory)
                .unwrap_or(false),
            None => true,
        };

        let detected = volume > self.threshold
            && volume > average * (1.0 + self.sensitivity)
            && refractory_over;

        self.history.push_back(volume);
        if self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.average = self.history.iter().sum::<f32>() / self.history.len() as f32;

        if !detected {
            return BeatDecision::default();
        }

        self.last_beat = Some(at);
        let intensity = if average > f32::EPSILON {
            ((volume - average) / average).clamp(0.0, 1.0)
        } else {
            1.0
        };

        BeatDecision {
            detected: true,
            intensity,
        }
    }

    /// Change the absolute threshold without touching the history
    pub fn set_threshold(&mut self, threshold: f32) {
        if threshold.is_finite() {
            self.threshold = threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
        }
    }

    /// Change the sensitivity without touching the history
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        if sensitivity.is_finite() {
            self.sensitivity = sensitivity.clamp(SENSITIVITY_RANGE.0, SENSITIVITY_RANGE.1);
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Mean of the rolling volume history
    pub fn average(&self) -> f32 {
        self.average
    }

    pub fn last_beat(&self) -> Option<Duration> {
        self.last_beat
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.average = 0.0;
        self.last_beat = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ~23ms, one 1024-sample frame at 44.1kHz
    fn frame_time(i: usize) -> Duration {
        Duration::from_secs_f64(i as f64 * 1024.0 / 44100.0)
    }

    #[test]
    fn spike_after_quiet_baseline_is_the_only_beat() {
        let mut detector = BeatDetector::new(&BeatConfig::default());
        let volumes: Vec<f32> = std::iter::repeat(0.01).take(40).chain([0.9]).collect();

        let decisions: Vec<BeatDecision> = volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| detector.detect(v, frame_time(i)))
            .collect();

        assert!(decisions[..40].iter().all(|d| !d.detected));
        assert!(decisions[40].detected);
        assert_eq!(decisions[40].intensity, 1.0);
    }

    #[test]
    fn beats_never_closer_than_refractory_interval() {
        let mut detector = BeatDetector::new(&BeatConfig::default());
        let mut state = 7u32;
        let mut beats = Vec::new();

        for i in 0..2000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let roll = (state >> 16) % 100;
            let volume = if roll < 30 { 0.9 } else { 0.06 };
            let at = Duration::from_millis(i * 10);
            if detector.detect(volume, at).detected {
                beats.push(at);
            }
        }

        assert!(beats.len() > 5, "expected some beats, got {}", beats.len());
        for pair in beats.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(200));
        }
    }

    #[test]
    fn quiet_signal_below_threshold_never_beats() {
        let mut detector = BeatDetector::new(&BeatConfig::default());

        for i in 0..100 {
            let volume = if i % 10 == 0 { 0.04 } else { 0.001 };
            assert!(!detector.detect(volume, frame_time(i)).detected);
        }
    }

    #[test]
    fn intensity_is_relative_rise_over_average() {
        let mut detector = BeatDetector::new(&BeatConfig::default());
        for i in 0..43 {
            detector.detect(0.2, frame_time(i));
        }

        let decision = detector.detect(0.3, frame_time(43));

        assert!(decision.detected);
        assert!((decision.intensity - 0.5).abs() < 1e-4);
    }

    #[test]
    fn tuning_keeps_history_and_clamps() {
        let mut detector = BeatDetector::new(&BeatConfig::default());
        for i in 0..10 {
            detector.detect(0.2, frame_time(i));
        }
        let average = detector.average();

        detector.set_sensitivity(42.0);
        detector.set_threshold(-1.0);

        assert_eq!(detector.average(), average);
        assert_eq!(detector.sensitivity(), 5.0);
        assert_eq!(detector.threshold(), 0.0);

        detector.set_sensitivity(f32::NAN);
        assert_eq!(detector.sensitivity(), 5.0);
    }

    #[test]
    fn history_is_bounded() {
        let config = BeatConfig {
            history_size: 4,
            ..Default::default()
        };
        let mut detector = BeatDetector::new(&config);
        for (i, v) in [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0].iter().enumerate() {
            detector.detect(*v, frame_time(i));
        }

        assert_eq!(detector.average(), 0.0);
    }
}
