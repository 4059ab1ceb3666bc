//! Merging partial analyses and deriving mood/genre labels.
//!
//! The mood and genre rules are coarse heuristics over a handful of
//! features. The thresholds are configurable defaults, not values fitted to
//! real recordings.

use super::{AnalysisResult, Genre, Mood, PartialAnalysis};
use serde::{Deserialize, Serialize};

/// Thresholds for the derived fields and labels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierThresholds {
    /// RMS volume that maps to full energy
    pub energy_reference: f32,
    /// Energy under which the signal is treated as silence (neutral labels)
    pub silence_energy: f32,

    pub high_arousal: f32,
    pub low_arousal: f32,
    pub high_valence: f32,
    pub low_valence: f32,

    /// Centroid (Hz) treated as fully bright for the valence proxy
    pub bright_centroid_hz: f32,

    pub electronic_min_bpm: f32,
    pub electronic_min_regularity: f32,
    pub hiphop_min_bpm: f32,
    pub hiphop_max_bpm: f32,
    pub hiphop_min_bass_ratio: f32,
    pub rock_min_energy: f32,
    pub rock_min_centroid_hz: f32,
    pub ambient_max_energy: f32,
    pub ambient_max_bpm: f32,
    pub jazz_min_complexity: f32,
    pub jazz_max_regularity: f32,
    pub classical_max_energy: f32,
    pub classical_max_flatness: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            energy_reference: 0.3,
            silence_energy: 0.01,
            high_arousal: 0.6,
            low_arousal: 0.4,
            high_valence: 0.3,
            low_valence: -0.3,
            bright_centroid_hz: 4000.0,
            electronic_min_bpm: 140.0,
            electronic_min_regularity: 0.7,
            hiphop_min_bpm: 85.0,
            hiphop_max_bpm: 115.0,
            hiphop_min_bass_ratio: 0.45,
            rock_min_energy: 0.6,
            rock_min_centroid_hz: 2500.0,
            ambient_max_energy: 0.3,
            ambient_max_bpm: 90.0,
            jazz_min_complexity: 0.5,
            jazz_max_regularity: 0.6,
            classical_max_energy: 0.45,
            classical_max_flatness: 0.1,
        }
    }
}

impl ClassifierThresholds {
    /// Pick a mood from the valence/arousal quadrant
    pub fn mood(&self, valence: f32, arousal: f32) -> Mood {
        let high_arousal = arousal >= self.high_arousal;
        let low_arousal = arousal <= self.low_arousal;
        let high_valence = valence >= self.high_valence;
        let low_valence = valence <= self.low_valence;

        match (high_arousal, low_arousal, high_valence, low_valence) {
            (true, _, true, _) => Mood::Excited,
            (true, _, _, true) => Mood::Angry,
            (_, true, true, _) => Mood::Calm,
            (_, true, _, true) => Mood::Sad,
            _ if valence > 0.0 => Mood::Happy,
            _ => Mood::Neutral,
        }
    }

    /// Pick a genre from tempo, timbre and rhythm
    pub fn genre(&self, result: &AnalysisResult) -> Genre {
        let (low, mid, high) = result.low_mid_high();
        let total = low + mid + high;
        let bass_ratio = if total > 0.0 { low / total } else { 0.0 };
        let bpm = result.bpm;
        let regularity = result.rhythm_regularity;

        if bpm > self.electronic_min_bpm && regularity > self.electronic_min_regularity {
            Genre::Electronic
        } else if (self.hiphop_min_bpm..=self.hiphop_max_bpm).contains(&bpm)
            && bass_ratio >= self.hiphop_min_bass_ratio
            && regularity > 0.5
        {
            Genre::HipHop
        } else if result.energy >= self.rock_min_energy
            && result.spectral_centroid >= self.rock_min_centroid_hz
        {
            Genre::Rock
        } else if result.energy <= self.ambient_max_energy && bpm <= self.ambient_max_bpm {
            Genre::Ambient
        } else if result.complexity >= self.jazz_min_complexity
            && regularity <= self.jazz_max_regularity
        {
            Genre::Jazz
        } else if result.energy <= self.classical_max_energy
            && result.spectral_flatness <= self.classical_max_flatness
        {
            Genre::Classical
        } else {
            Genre::Pop
        }
    }
}

/// Combines independently produced partial analyses into one result.
///
/// Persistent fields only change when a partial carries a non-default
/// value, so a rhythm update never wipes spectral fields and vice versa.
/// Beat fields describe a single frame and are cleared on every combine.
pub struct Aggregator {
    current: AnalysisResult,
    thresholds: ClassifierThresholds,
}

impl Aggregator {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self {
            current: AnalysisResult::default(),
            thresholds,
        }
    }

    /// Merge `partials` in order and recompute the derived fields
    pub fn combine(&mut self, partials: &[PartialAnalysis]) -> AnalysisResult {
        self.current.beat_detected = false;
        self.current.beat_intensity = 0.0;

        for partial in partials {
            self.merge(partial);
        }

        self.derive();
        self.current.clone()
    }

    /// Zero every signal-level field after a digitally silent frame.
    ///
    /// Zero values never win a merge, so without this the last loud frame
    /// would linger through silence. Rhythm fields are kept.
    pub fn clear_signal(&mut self) {
        let current = &mut self.current;
        current.volume = 0.0;
        current.bands.iter_mut().for_each(|b| *b = 0.0);
        current.spectral_centroid = 0.0;
        current.spectral_rolloff = 0.0;
        current.spectral_flux = 0.0;
        current.spectral_bandwidth = 0.0;
        current.spectral_contrast = 0.0;
        current.spectral_flatness = 0.0;
        current.zero_crossing_rate = 0.0;
    }

    pub fn current(&self) -> &AnalysisResult {
        &self.current
    }

    fn merge(&mut self, partial: &PartialAnalysis) {
        let current = &mut self.current;
        merge_f32(&mut current.volume, partial.volume);
        merge_f32(&mut current.spectral_centroid, partial.spectral_centroid);
        merge_f32(&mut current.spectral_rolloff, partial.spectral_rolloff);
        merge_f32(&mut current.spectral_flux, partial.spectral_flux);
        merge_f32(&mut current.spectral_bandwidth, partial.spectral_bandwidth);
        merge_f32(&mut current.spectral_contrast, partial.spectral_contrast);
        merge_f32(&mut current.spectral_flatness, partial.spectral_flatness);
        merge_f32(&mut current.zero_crossing_rate, partial.zero_crossing_rate);
        merge_f32(&mut current.beat_intensity, partial.beat_intensity);
        merge_f32(&mut current.bpm, partial.bpm);
        merge_f32(&mut current.rhythm_regularity, partial.rhythm_regularity);
        merge_f32(&mut current.rhythm_complexity, partial.rhythm_complexity);

        if let Some(bands) = partial.bands.as_ref().filter(|b| !b.is_empty()) {
            current.bands.clone_from(bands);
        }
        if partial.beat_detected == Some(true) {
            current.beat_detected = true;
        }
        if let Some(timestamp) = partial.timestamp.filter(|t| *t > current.timestamp) {
            current.timestamp = timestamp;
        }
    }

    fn derive(&mut self) {
        let t = &self.thresholds;
        let r = &mut self.current;

        r.dominant_band = r
            .bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, v)| **v > 0.0)
            .map(|(i, _)| i)
            .unwrap_or(0);

        r.energy = if t.energy_reference > 0.0 {
            (r.volume / t.energy_reference).clamp(0.0, 1.0)
        } else {
            0.0
        };
        r.intensity = (r.volume * 100.0 + r.energy * 50.0).min(1.0);
        r.complexity = (r.spectral_bandwidth + r.spectral_contrast + r.rhythm_complexity) / 3.0;

        if r.energy < t.silence_energy {
            r.valence = 0.0;
            r.arousal = 0.0;
            r.mood = Mood::Neutral;
            r.genre = Genre::Unknown;
            return;
        }

        let tempo_norm = ((r.bpm - 60.0) / 120.0).clamp(0.0, 1.0);
        let flux_norm = (r.spectral_flux * 2.0).clamp(0.0, 1.0);
        r.arousal = (0.5 * r.energy + 0.3 * tempo_norm + 0.2 * flux_norm).clamp(0.0, 1.0);

        let brightness = if t.bright_centroid_hz > 0.0 {
            (r.spectral_centroid / t.bright_centroid_hz).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let tonality = 1.0 - r.spectral_flatness.clamp(0.0, 1.0);
        let positivity = 0.4 * brightness + 0.3 * r.rhythm_regularity + 0.3 * tonality;
        r.valence = (positivity * 2.0 - 1.0).clamp(-1.0, 1.0);

        r.mood = t.mood(r.valence, r.arousal);
        r.genre = t.genre(r);
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(ClassifierThresholds::default())
    }
}

fn merge_f32(target: &mut f32, value: Option<f32>) {
    if let Some(v) = value {
        if v != 0.0 && v.is_finite() {
            *target = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    fn spectral() -> PartialAnalysis {
        PartialAnalysis {
            volume: Some(0.2),
            bands: Some(vec![0.3, 0.2, 0.1]),
            spectral_centroid: Some(1500.0),
            spectral_flatness: Some(0.05),
            timestamp: Some(Duration::from_millis(100)),
            ..Default::default()
        }
    }

    fn rhythm() -> PartialAnalysis {
        PartialAnalysis {
            bpm: Some(128.0),
            rhythm_regularity: Some(0.9),
            rhythm_complexity: Some(0.1),
            ..Default::default()
        }
    }

    #[test]
    fn disjoint_partials_merge_into_their_union() {
        let mut aggregator = Aggregator::default();

        let result = aggregator.combine(&[spectral(), rhythm()]);

        assert_eq!(result.volume, 0.2);
        assert_eq!(result.bands, vec![0.3, 0.2, 0.1]);
        assert_eq!(result.spectral_centroid, 1500.0);
        assert_eq!(result.bpm, 128.0);
        assert_eq!(result.rhythm_regularity, 0.9);
        assert_eq!(result.timestamp, Duration::from_millis(100));
    }

    #[test]
    fn default_partials_never_overwrite() {
        let mut aggregator = Aggregator::default();
        aggregator.combine(&[spectral(), rhythm()]);

        let zeroed = PartialAnalysis {
            volume: Some(0.0),
            bands: Some(Vec::new()),
            bpm: Some(0.0),
            rhythm_regularity: Some(0.0),
            ..Default::default()
        };
        let result = aggregator.combine(&[PartialAnalysis::default(), zeroed]);

        assert_eq!(result.volume, 0.2);
        assert_eq!(result.bands, vec![0.3, 0.2, 0.1]);
        assert_eq!(result.bpm, 128.0);
        assert_eq!(result.rhythm_regularity, 0.9);
    }

    #[test]
    fn beat_flag_lasts_one_combine() {
        let mut aggregator = Aggregator::default();
        let beat = PartialAnalysis {
            beat_detected: Some(true),
            beat_intensity: Some(0.7),
            ..Default::default()
        };

        let on_beat = aggregator.combine(&[spectral(), beat]);
        let next = aggregator.combine(&[spectral()]);

        assert!(on_beat.beat_detected);
        assert_eq!(on_beat.beat_intensity, 0.7);
        assert!(!next.beat_detected);
        assert_eq!(next.beat_intensity, 0.0);
    }

    #[test]
    fn derived_intensity_and_complexity_follow_formulas() {
        let mut aggregator = Aggregator::default();
        let partial = PartialAnalysis {
            volume: Some(0.002),
            spectral_bandwidth: Some(0.3),
            spectral_contrast: Some(0.6),
            rhythm_complexity: Some(0.3),
            ..Default::default()
        };

        let result = aggregator.combine(&[partial]);

        // energy = 0.002 / 0.3
        assert_approx(result.energy, 0.006_667, 1e-5);
        assert_approx(result.intensity, 0.2 + 0.006_667 * 50.0, 1e-4);
        assert_approx(result.complexity, 0.4, 1e-6);
    }

    #[test]
    fn intensity_saturates_at_one() {
        let mut aggregator = Aggregator::default();

        let result = aggregator.combine(&[spectral()]);

        assert_eq!(result.intensity, 1.0);
    }

    #[test]
    fn mood_quadrants() {
        let t = ClassifierThresholds::default();

        assert_eq!(t.mood(0.8, 0.9), Mood::Excited);
        assert_eq!(t.mood(-0.8, 0.9), Mood::Angry);
        assert_eq!(t.mood(0.8, 0.1), Mood::Calm);
        assert_eq!(t.mood(-0.8, 0.1), Mood::Sad);
        assert_eq!(t.mood(0.1, 0.5), Mood::Happy);
        assert_eq!(t.mood(-0.1, 0.5), Mood::Neutral);
    }

    // Heuristic thresholds: these pin the rule order, not real-world accuracy.
    #[test]
    fn genre_heuristics_are_approximate_rules() {
        let t = ClassifierThresholds::default();
        let base = AnalysisResult {
            bands: vec![0.1, 0.1, 0.1],
            energy: 0.5,
            spectral_flatness: 0.3,
            ..Default::default()
        };

        let electronic = AnalysisResult {
            bpm: 150.0,
            rhythm_regularity: 0.9,
            ..base.clone()
        };
        let hiphop = AnalysisResult {
            bpm: 95.0,
            rhythm_regularity: 0.8,
            bands: vec![0.6, 0.2, 0.1],
            ..base.clone()
        };
        let rock = AnalysisResult {
            energy: 0.8,
            spectral_centroid: 3200.0,
            ..base.clone()
        };
        let ambient = AnalysisResult {
            energy: 0.2,
            bpm: 70.0,
            ..base.clone()
        };

        assert_eq!(t.genre(&electronic), Genre::Electronic);
        assert_eq!(t.genre(&hiphop), Genre::HipHop);
        assert_eq!(t.genre(&rock), Genre::Rock);
        assert_eq!(t.genre(&ambient), Genre::Ambient);
        assert_eq!(t.genre(&base), Genre::Pop);
    }

    #[test]
    fn silence_is_neutral_and_unknown() {
        let mut aggregator = Aggregator::default();
        aggregator.combine(&[spectral(), rhythm()]);

        aggregator.clear_signal();
        let result = aggregator.combine(&[]);

        assert_eq!(result.volume, 0.0);
        assert!(result.bands.iter().all(|b| *b == 0.0));
        assert_eq!(result.mood, Mood::Neutral);
        assert_eq!(result.genre, Genre::Unknown);
        assert_eq!(result.bpm, 128.0);
        assert!(result.valence.is_finite() && result.arousal.is_finite());
    }

    #[test]
    fn labels_are_derived_for_loud_input() {
        let mut aggregator = Aggregator::default();
        let loud = PartialAnalysis {
            volume: Some(0.3),
            bands: Some(vec![0.2, 0.2, 0.2]),
            spectral_centroid: Some(4000.0),
            spectral_flux: Some(0.5),
            spectral_flatness: Some(0.01),
            ..Default::default()
        };
        let steady_fast = PartialAnalysis {
            bpm: Some(170.0),
            rhythm_regularity: Some(0.95),
            ..Default::default()
        };

        let result = aggregator.combine(&[loud, steady_fast]);

        assert!(result.arousal >= 0.6, "arousal {}", result.arousal);
        assert!(result.valence >= 0.3, "valence {}", result.valence);
        assert_eq!(result.mood, Mood::Excited);
        assert_eq!(result.genre, Genre::Electronic);
    }
}
