//! Pure audio-to-command mappings, one per effect kind

use super::{
    BeatSyncParams, CommandStep, FrequencyParams, MoodParams, PartyParams, Rgb, SpectrumParams,
    VolumeParams,
};
use crate::audio::{AnalysisResult, Mood};
use crate::device::CommandKind;
use std::time::Duration;

const FLASH_LEVEL: u8 = 255;
const BEAT_SYNC_FLOOR: u8 = 10;

fn level(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn lerp_level(min: u8, max: u8, t: f32) -> u8 {
    let t = t.clamp(0.0, 1.0);
    level(min as f32 + (max as f32 - min as f32) * t)
}

fn is_strong_beat(analysis: &AnalysisResult, sensitivity: f32) -> bool {
    analysis.beat_detected && analysis.beat_intensity >= sensitivity
}

/// Flash to full on a strong beat then fade to `128 * intensity`,
/// otherwise follow volume within [10, 255].
pub fn beat_sync(analysis: &AnalysisResult, params: &BeatSyncParams) -> Vec<CommandStep> {
    if is_strong_beat(analysis, params.beat_sensitivity) {
        let mut steps = Vec::with_capacity(3);
        if let Some(color) = params.color {
            steps.push(CommandStep::now(CommandKind::SetColor(color)));
        }
        steps.push(CommandStep::now(CommandKind::SetBrightness(FLASH_LEVEL)));
        steps.push(CommandStep::after(
            CommandKind::SetBrightness(level(128.0 * analysis.beat_intensity)),
            Duration::from_millis(params.flash_duration_ms),
        ));
        return steps;
    }

    let brightness = (analysis.volume * params.volume_gain * 255.0)
        .round()
        .clamp(BEAT_SYNC_FLOOR as f32, 255.0) as u8;
    vec![CommandStep::now(CommandKind::SetBrightness(brightness))]
}

/// Mix the low, mid and high band energies into one color
pub fn frequency(analysis: &AnalysisResult, params: &FrequencyParams) -> Vec<CommandStep> {
    let (low, mid, high) = analysis.low_mid_high();

    let color = params
        .low_freq_color
        .scale(low * params.gain)
        .saturating_add(params.mid_freq_color.scale(mid * params.gain))
        .saturating_add(params.high_freq_color.scale(high * params.gain));

    vec![CommandStep::now(CommandKind::SetColor(color))]
}

/// Brightness interpolated between min and max by volume
pub fn volume_reactive(analysis: &AnalysisResult, params: &VolumeParams) -> Vec<CommandStep> {
    let brightness = lerp_level(
        params.min_brightness,
        params.max_brightness,
        analysis.volume * params.volume_gain,
    );

    let mut steps = Vec::with_capacity(2);
    if let Some(color) = params.color {
        steps.push(CommandStep::now(CommandKind::SetColor(color)));
    }
    steps.push(CommandStep::now(CommandKind::SetBrightness(brightness)));
    steps
}

/// Hue and saturation for each mood
fn mood_hue(mood: Mood) -> (f32, f32) {
    match mood {
        Mood::Excited => (300.0, 1.0),
        Mood::Happy => (50.0, 1.0),
        Mood::Angry => (0.0, 1.0),
        Mood::Calm => (180.0, 0.8),
        Mood::Sad => (230.0, 0.9),
        Mood::Neutral => (35.0, 0.3),
    }
}

/// Color from the mood table, brightness from arousal
pub fn mood(analysis: &AnalysisResult, params: &MoodParams) -> Vec<CommandStep> {
    let (hue, saturation) = mood_hue(analysis.mood);
    let color = Rgb::from_hsv(hue, saturation * params.saturation, 1.0);
    let brightness = lerp_level(params.min_brightness, params.max_brightness, analysis.arousal);

    vec![
        CommandStep::now(CommandKind::SetColor(color)),
        CommandStep::now(CommandKind::SetBrightness(brightness)),
    ]
}

/// Hue from the dominant band, brightness from spectral flux
pub fn spectrum(analysis: &AnalysisResult, params: &SpectrumParams) -> Vec<CommandStep> {
    let bands = analysis.bands.len();
    // Spread bands over red..magenta so the lowest and highest stay distinct
    let hue = if bands > 1 {
        analysis.dominant_band.min(bands - 1) as f32 * 300.0 / (bands - 1) as f32
    } else {
        0.0
    };

    let color = Rgb::from_hsv(hue, params.saturation, 1.0);
    let brightness = lerp_level(
        params.min_brightness,
        255,
        analysis.spectral_flux * params.flux_gain,
    );

    vec![
        CommandStep::now(CommandKind::SetColor(color)),
        CommandStep::now(CommandKind::SetBrightness(brightness)),
    ]
}

/// Time-rotating hue with a short full-brightness strobe on strong beats
pub fn party(analysis: &AnalysisResult, params: &PartyParams, elapsed: Duration) -> Vec<CommandStep> {
    let hue = elapsed.as_secs_f32() * params.rotation_speed;
    let color = Rgb::from_hsv(hue, params.saturation, 1.0);

    let mut steps = vec![CommandStep::now(CommandKind::SetColor(color))];
    if is_strong_beat(analysis, params.beat_sensitivity) {
        steps.push(CommandStep::now(CommandKind::SetBrightness(FLASH_LEVEL)));
        steps.push(CommandStep::after(
            CommandKind::SetBrightness(params.brightness),
            Duration::from_millis(params.strobe_duration_ms),
        ));
    } else {
        steps.push(CommandStep::now(CommandKind::SetBrightness(params.brightness)));
    }
    steps
}
