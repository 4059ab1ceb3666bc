//! Built-in audio-to-light effects
//!
//! Each effect kind has a typed parameter struct and a pure mapping from the
//! latest [`AnalysisResult`] to a list of [`CommandStep`]s. The engine fans
//! the steps out to every target device.

mod color;
mod mappings;
mod params;

pub use color::Rgb;
pub use params::{
    decode, BeatSyncParams, FrequencyParams, MoodParams, ParamError, PartyParams,
    SpectrumParams, VolumeParams, MAX_STEP_DELAY_MS,
};

use crate::audio::AnalysisResult;
use crate::device::CommandKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Closed set of built-in effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    BeatSync,
    Frequency,
    VolumeReactive,
    Mood,
    Spectrum,
    Party,
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        EffectKind::BeatSync,
        EffectKind::Frequency,
        EffectKind::VolumeReactive,
        EffectKind::Mood,
        EffectKind::Spectrum,
        EffectKind::Party,
    ];

    /// Parse a preset type or id, ignoring case, spaces, `-` and `_`
    pub fn parse(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(*c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "beatsync" | "beat" => Some(EffectKind::BeatSync),
            "frequency" | "frequencyvisualization" | "freq" => Some(EffectKind::Frequency),
            "volume" | "volumereactive" => Some(EffectKind::VolumeReactive),
            "mood" | "moodlighting" => Some(EffectKind::Mood),
            "spectrum" | "spectrumanalyzer" => Some(EffectKind::Spectrum),
            "party" | "partymode" => Some(EffectKind::Party),
            _ => None,
        }
    }

    /// Kind for a preset: its type if recognized, else its id, else the
    /// volume-reactive fallback.
    pub fn resolve(preset_type: Option<&str>, preset_id: &str) -> Self {
        if let Some(kind) = preset_type.and_then(Self::parse) {
            return kind;
        }
        Self::parse(preset_id).unwrap_or_else(|| {
            log::debug!(
                "Unknown preset {} (type {:?}), using volume-reactive",
                preset_id,
                preset_type
            );
            EffectKind::VolumeReactive
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::BeatSync => "beat_sync",
            EffectKind::Frequency => "frequency",
            EffectKind::VolumeReactive => "volume_reactive",
            EffectKind::Mood => "mood",
            EffectKind::Spectrum => "spectrum",
            EffectKind::Party => "party",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command an effect wants sent, `delay` after the tick that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStep {
    pub kind: CommandKind,
    pub delay: Duration,
}

impl CommandStep {
    pub fn now(kind: CommandKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
        }
    }

    pub fn after(kind: CommandKind, delay: Duration) -> Self {
        Self { kind, delay }
    }
}

/// An effect kind bound to its decoded parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    BeatSync(BeatSyncParams),
    Frequency(FrequencyParams),
    VolumeReactive(VolumeParams),
    Mood(MoodParams),
    Spectrum(SpectrumParams),
    Party(PartyParams),
}

impl Effect {
    /// Decode the parameters for `kind` from a preset's parameter map
    pub fn from_params(kind: EffectKind, params: &Map<String, Value>) -> Result<Self, ParamError> {
        Ok(match kind {
            EffectKind::BeatSync => {
                let params: BeatSyncParams = decode(params)?;
                params.validate()?;
                Effect::BeatSync(params)
            }
            EffectKind::Frequency => Effect::Frequency(decode(params)?),
            EffectKind::VolumeReactive => Effect::VolumeReactive(decode(params)?),
            EffectKind::Mood => Effect::Mood(decode(params)?),
            EffectKind::Spectrum => Effect::Spectrum(decode(params)?),
            EffectKind::Party => {
                let params: PartyParams = decode(params)?;
                params.validate()?;
                Effect::Party(params)
            }
        })
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::BeatSync(_) => EffectKind::BeatSync,
            Effect::Frequency(_) => EffectKind::Frequency,
            Effect::VolumeReactive(_) => EffectKind::VolumeReactive,
            Effect::Mood(_) => EffectKind::Mood,
            Effect::Spectrum(_) => EffectKind::Spectrum,
            Effect::Party(_) => EffectKind::Party,
        }
    }

    /// Commands for one tick. `elapsed` is time since the execution cycle began.
    pub fn render(&self, analysis: &AnalysisResult, elapsed: Duration) -> Vec<CommandStep> {
        match self {
            Effect::BeatSync(p) => mappings::beat_sync(analysis, p),
            Effect::Frequency(p) => mappings::frequency(analysis, p),
            Effect::VolumeReactive(p) => mappings::volume_reactive(analysis, p),
            Effect::Mood(p) => mappings::mood(analysis, p),
            Effect::Spectrum(p) => mappings::spectrum(analysis, p),
            Effect::Party(p) => mappings::party(analysis, p, elapsed),
        }
    }
}
