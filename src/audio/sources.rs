//! Capture source ids and enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where audio is captured from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    /// Loopback of the default output device
    SystemAudio,
    /// Loopback of a named output device
    Output(String),
    /// A named input device (microphone, line in)
    Input(String),
}

impl SourceId {
    /// Parse a source id string. `None`, empty and unrecognized ids mean
    /// system audio.
    pub fn parse(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if id.starts_with("output:") => {
                SourceId::Output(id.trim_start_matches("output:").to_string())
            }
            Some(id) if id.starts_with("input:") => {
                SourceId::Input(id.trim_start_matches("input:").to_string())
            }
            _ => SourceId::SystemAudio,
        }
    }

    /// Whether capture reads back what an output device plays
    pub fn is_loopback(&self) -> bool {
        !matches!(self, SourceId::Input(_))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::SystemAudio => f.write_str("system_audio"),
            SourceId::Output(name) => write!(f, "output:{}", name),
            SourceId::Input(name) => write!(f, "input:{}", name),
        }
    }
}

/// Audio source information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSource {
    /// Id accepted by the capture thread
    pub id: String,

    /// Display name
    pub name: String,

    pub source_type: SourceType,
}

/// Type of audio source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// System-wide audio (loopback)
    SystemAudio,

    /// Input device (microphone)
    InputDevice,
}

/// Audio source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),
}

/// List capture sources on the default host: system audio first, then other
/// outputs as loopback sources, then inputs.
pub fn list_sources() -> Result<Vec<AudioSource>, SourceError> {
    let host = cpal::default_host();
    let mut sources = Vec::new();

    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    if let Some(name) = &default_output {
        sources.push(AudioSource {
            id: SourceId::SystemAudio.to_string(),
            name: format!("System Audio ({})", name),
            source_type: SourceType::SystemAudio,
        });
    }

    let outputs = host
        .output_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?;
    for name in outputs.filter_map(|d| d.name().ok()) {
        if default_output.as_deref() == Some(name.as_str()) {
            continue;
        }
        sources.push(AudioSource {
            id: SourceId::Output(name.clone()).to_string(),
            name: format!("Loopback: {}", name),
            source_type: SourceType::SystemAudio,
        });
    }

    match host.input_devices() {
        Ok(inputs) => {
            for name in inputs.filter_map(|d| d.name().ok()) {
                sources.push(AudioSource {
                    id: SourceId::Input(name.clone()).to_string(),
                    name: format!("Input: {}", name),
                    source_type: SourceType::InputDevice,
                });
            }
        }
        Err(e) => log::warn!("Failed to enumerate input devices: {}", e),
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_source_ids() {
        assert_eq!(SourceId::parse(None), SourceId::SystemAudio);
        assert_eq!(SourceId::parse(Some("system_audio")), SourceId::SystemAudio);
        assert_eq!(
            SourceId::parse(Some("output:Speakers (USB)")),
            SourceId::Output("Speakers (USB)".into())
        );
        assert_eq!(SourceId::parse(Some(" input:Mic ")), SourceId::Input("Mic".into()));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for id in [
            SourceId::SystemAudio,
            SourceId::Output("Monitor".into()),
            SourceId::Input("Line In".into()),
        ] {
            assert_eq!(SourceId::parse(Some(&id.to_string())), id);
        }
    }

    #[test]
    fn only_inputs_are_not_loopback() {
        assert!(SourceId::SystemAudio.is_loopback());
        assert!(SourceId::Output("x".into()).is_loopback());
        assert!(!SourceId::Input("x".into()).is_loopback());
    }
}
