//! Typed per-effect parameters decoded from a preset's string-keyed map

use super::Rgb;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Parameter decoding errors
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid parameters: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{name} = {value} is out of range (max {max})")]
    OutOfRange {
        name: &'static str,
        value: u64,
        max: u64,
    },
}

/// Longest delay an effect may put between a command and its follow-up
pub const MAX_STEP_DELAY_MS: u64 = 5_000;

fn check_delay(name: &'static str, value: u64) -> Result<(), ParamError> {
    if value > MAX_STEP_DELAY_MS {
        return Err(ParamError::OutOfRange {
            name,
            value,
            max: MAX_STEP_DELAY_MS,
        });
    }
    Ok(())
}

/// Decode a parameter struct from a preset's parameter map.
///
/// Missing keys take the struct defaults and unknown keys are ignored.
/// A known key holding the wrong type is an error.
pub fn decode<T: DeserializeOwned>(params: &Map<String, Value>) -> Result<T, ParamError> {
    Ok(serde_json::from_value(Value::Object(params.clone()))?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BeatSyncParams {
    /// Minimum beat intensity that triggers a flash
    pub beat_sensitivity: f32,

    /// How long the flash holds full brightness before fading
    pub flash_duration_ms: u64,

    /// Scales volume before it is mapped to brightness between beats
    pub volume_gain: f32,

    /// Optional color sent along with every flash
    pub color: Option<Rgb>,
}

impl BeatSyncParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_delay("flashDurationMs", self.flash_duration_ms)
    }
}

impl Default for BeatSyncParams {
    fn default() -> Self {
        Self {
            beat_sensitivity: 0.5,
            flash_duration_ms: 100,
            volume_gain: 1.0,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrequencyParams {
    pub low_freq_color: Rgb,
    pub mid_freq_color: Rgb,
    pub high_freq_color: Rgb,

    /// Band energies are multiplied by this before mixing
    pub gain: f32,
}

impl Default for FrequencyParams {
    fn default() -> Self {
        Self {
            low_freq_color: Rgb::RED,
            mid_freq_color: Rgb::GREEN,
            high_freq_color: Rgb::BLUE,
            gain: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeParams {
    pub min_brightness: u8,
    pub max_brightness: u8,
    pub volume_gain: f32,
    pub color: Option<Rgb>,
}

impl Default for VolumeParams {
    fn default() -> Self {
        Self {
            min_brightness: 10,
            max_brightness: 255,
            volume_gain: 1.0,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MoodParams {
    pub min_brightness: u8,
    pub max_brightness: u8,
    pub saturation: f32,
}

impl Default for MoodParams {
    fn default() -> Self {
        Self {
            min_brightness: 30,
            max_brightness: 255,
            saturation: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpectrumParams {
    pub min_brightness: u8,
    pub flux_gain: f32,
    pub saturation: f32,
}

impl Default for SpectrumParams {
    fn default() -> Self {
        Self {
            min_brightness: 20,
            flux_gain: 4.0,
            saturation: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartyParams {
    /// Hue rotation in degrees per second
    pub rotation_speed: f32,
    pub beat_sensitivity: f32,
    pub strobe_duration_ms: u64,
    pub brightness: u8,
    pub saturation: f32,
}

impl PartyParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check_delay("strobeDurationMs", self.strobe_duration_ms)
    }
}

impl Default for PartyParams {
    fn default() -> Self {
        Self {
            rotation_speed: 90.0,
            beat_sensitivity: 0.3,
            strobe_duration_ms: 80,
            brightness: 180,
            saturation: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn empty_map_gives_defaults() {
        let params: BeatSyncParams = decode(&Map::new()).unwrap();
        assert_eq!(params, BeatSyncParams::default());
    }

    #[test]
    fn unknown_keys_are_ignored_and_known_keys_apply() {
        let params: BeatSyncParams = decode(&map(json!({
            "beatSensitivity": 0.8,
            "somethingElse": [1, 2, 3]
        })))
        .unwrap();

        assert_eq!(params.beat_sensitivity, 0.8);
        assert_eq!(params.flash_duration_ms, 100);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let result: Result<BeatSyncParams, _> =
            decode(&map(json!({ "beatSensitivity": "very" })));
        assert!(matches!(result, Err(ParamError::Malformed(_))));
    }

    #[test]
    fn colors_decode_from_strings() {
        let params: FrequencyParams = decode(&map(json!({
            "lowFreqColor": "#ff00ff",
            "highFreqColor": "white"
        })))
        .unwrap();

        assert_eq!(params.low_freq_color, Rgb::new(255, 0, 255));
        assert_eq!(params.mid_freq_color, Rgb::GREEN);
        assert_eq!(params.high_freq_color, Rgb::WHITE);

        let bad: Result<FrequencyParams, _> = decode(&map(json!({ "lowFreqColor": "mauve-ish" })));
        assert!(bad.is_err());
    }

    #[test]
    fn step_delays_are_capped() {
        let params: BeatSyncParams =
            decode(&map(json!({ "flashDurationMs": 3_600_000u64 }))).unwrap();
        assert!(matches!(
            params.validate(),
            Err(ParamError::OutOfRange { name: "flashDurationMs", max: MAX_STEP_DELAY_MS, .. })
        ));

        let params: PartyParams = decode(&map(json!({ "strobeDurationMs": 5_001 }))).unwrap();
        assert!(params.validate().is_err());

        let params: PartyParams =
            decode(&map(json!({ "strobeDurationMs": MAX_STEP_DELAY_MS }))).unwrap();
        assert!(params.validate().is_ok());
        assert!(BeatSyncParams::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_brightness_is_rejected() {
        let result: Result<VolumeParams, _> = decode(&map(json!({ "maxBrightness": 400 })));
        assert!(result.is_err());
    }
}
