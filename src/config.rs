//! Settings file

use crate::audio::AudioConfig;
use crate::engine::{EngineConfig, PresetDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A light the binary should register at start-up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    pub id: String,
    /// Passed to `connect`; empty means do not connect
    pub address: String,
}

/// Top-level settings. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub audio: AudioConfig,
    pub engine: EngineConfig,
    pub devices: Vec<DeviceConfig>,
    /// Group id to member device ids
    pub groups: HashMap<String, Vec<String>>,
    /// Stored presets, looked up by id before falling back to built-ins
    pub presets: Vec<PresetDefinition>,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_json(&text)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn preset(&self, id: &str) -> Option<&PresetDefinition> {
        self.presets.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let settings = Settings::from_json("{}").unwrap();

        assert_eq!(settings.audio.fft_size, 1024);
        assert_eq!(settings.engine.tick_interval_ms, 50);
        assert!(settings.devices.is_empty());
        assert!(settings.presets.is_empty());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = Settings::from_json(
            r#"{
                "audio": { "fftSize": 2048, "beat": { "sensitivity": 0.5, "refractoryMs": 250 } },
                "engine": { "tickIntervalMs": 25 },
                "devices": [{ "id": "desk", "address": "192.168.1.20" }],
                "groups": { "stage": ["desk"] },
                "presets": [{ "id": "club", "type": "party", "targetGroups": ["stage"] }]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.audio.fft_size, 2048);
        assert_eq!(settings.audio.band_count, 10);
        assert_eq!(settings.audio.beat.sensitivity, 0.5);
        assert_eq!(settings.audio.beat.refractory_ms, 250);
        assert_eq!(settings.engine.tick_interval_ms, 25);
        assert_eq!(settings.engine.command_timeout_ms, 250);
        assert_eq!(settings.devices[0].address, "192.168.1.20");
        assert_eq!(settings.groups["stage"], vec!["desk"]);
        assert_eq!(settings.preset("club").unwrap().kind.as_deref(), Some("party"));
        assert!(settings.preset("missing").is_none());
    }

    #[test]
    fn keys_are_camel_case_throughout() {
        let json = serde_json::to_value(Settings::default()).unwrap();

        assert!(json["audio"].get("fftSize").is_some());
        assert!(json["audio"]["beat"].get("refractoryMs").is_some());
        assert!(json["engine"].get("tickIntervalMs").is_some());
        assert!(json["engine"].get("tick_interval_ms").is_none());
    }

    #[test]
    fn bad_json_and_missing_files_are_errors() {
        assert!(matches!(
            Settings::from_json("{ nope"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Settings::load("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
