//! Preset definitions, start requests and per-execution runtime state

use crate::effects::{Effect, EffectKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Unique id of one preset execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of an execution. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
}

impl ExecutionState {
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Active)
                | (Starting, Stopping)
                | (Active, Stopping)
                | (Stopping, Stopped)
        )
    }
}

/// How long an execution runs and what it does at its edges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionSettings {
    /// Run time before auto-stop (or before restarting when looping)
    pub duration_ms: Option<u64>,

    /// Restart the cycle when `duration_ms` elapses instead of stopping
    #[serde(rename = "loop")]
    pub looping: bool,

    /// Short trial run: capped at the engine's preview length, never loops
    pub preview: bool,

    /// Turn target devices on when the execution starts
    pub power_on: bool,

    /// Turn target devices off when the execution stops
    pub power_off_on_stop: bool,

    /// Device-native effect selected on the targets at start
    pub effect: Option<String>,
}

impl ExecutionSettings {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    /// Effective cycle length, applying the preview cap
    pub fn cycle_limit(&self, preview_cap: Duration) -> Option<Duration> {
        if self.preview {
            Some(self.duration().map_or(preview_cap, |d| d.min(preview_cap)))
        } else {
            self.duration()
        }
    }

    pub fn loops(&self) -> bool {
        self.looping && !self.preview
    }
}

/// Stored preset as produced by the preset-management layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetDefinition {
    pub id: String,

    /// Effect kind name; the id is tried when this is absent or unknown
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(default)]
    pub target_devices: Vec<String>,

    #[serde(default)]
    pub target_groups: Vec<String>,
}

impl PresetDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_devices = devices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// A request to run a preset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub preset: PresetDefinition,

    /// Runtime overrides layered over the preset's stored parameters
    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(default)]
    pub settings: ExecutionSettings,
}

impl StartRequest {
    pub fn new(preset: PresetDefinition) -> Self {
        Self {
            preset,
            ..Default::default()
        }
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Preset parameters with the request's overrides applied
    pub fn merged_parameters(&self) -> Map<String, Value> {
        let mut merged = self.preset.parameters.clone();
        for (key, value) in &self.parameters {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Why an execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop call
    Requested,
    /// Replaced by a newer execution of the same preset
    Superseded,
    /// Duration (or preview length) elapsed
    Completed,
    /// Engine shutting down
    Shutdown,
}

/// Lifecycle notifications broadcast by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Started {
        id: ExecutionId,
        preset_id: String,
        effect: EffectKind,
    },
    Stopped {
        id: ExecutionId,
        preset_id: String,
        reason: StopReason,
    },
}

/// Read-only view of an execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub id: ExecutionId,
    pub preset_id: String,
    pub effect: EffectKind,
    pub state: ExecutionState,
    pub target_devices: Vec<String>,
    pub target_groups: Vec<String>,
    pub settings: ExecutionSettings,
    pub elapsed_ms: u64,
    pub ticks: u64,
    pub cycles: u32,
}

/// Runtime record of one preset being rendered to its targets
#[derive(Debug)]
pub struct ExecutionContext {
    id: ExecutionId,
    preset_id: String,
    effect: Effect,
    target_devices: Vec<String>,
    target_groups: Vec<String>,
    settings: ExecutionSettings,
    state: ExecutionState,
    started_at: Instant,
    cycle_started_at: Instant,
    cycle_limit: Option<Duration>,
    ticks: u64,
    cycles: u32,
    completed: bool,
}

impl ExecutionContext {
    pub(crate) fn new(
        request: StartRequest,
        effect: Effect,
        preview_cap: Duration,
        now: Instant,
    ) -> Self {
        let cycle_limit = request.settings.cycle_limit(preview_cap);
        Self {
            id: ExecutionId::new(),
            preset_id: request.preset.id,
            effect,
            target_devices: request.preset.target_devices,
            target_groups: request.preset.target_groups,
            settings: request.settings,
            state: ExecutionState::Idle,
            started_at: now,
            cycle_started_at: now,
            cycle_limit,
            ticks: 0,
            cycles: 0,
            completed: false,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn preset_id(&self) -> &str {
        &self.preset_id
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn target_devices(&self) -> &[String] {
        &self.target_devices
    }

    pub fn target_groups(&self) -> &[String] {
        &self.target_groups
    }

    pub(crate) fn transition(&mut self, next: ExecutionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            log::warn!(
                "Execution {}: unexpected transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
        }
        log::debug!("Execution {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Restart the clocks, e.g. once start-up work has finished
    pub(crate) fn reset_clock(&mut self, now: Instant) {
        self.started_at = now;
        self.cycle_started_at = now;
    }

    /// Advance one tick. Returns time into the current cycle, or `None` once
    /// the execution has run its course.
    pub(crate) fn advance(&mut self, now: Instant) -> Option<Duration> {
        let mut elapsed = now.saturating_duration_since(self.cycle_started_at);

        if let Some(limit) = self.cycle_limit {
            if elapsed >= limit {
                if !self.settings.loops() {
                    return None;
                }
                self.cycle_started_at = now;
                self.cycles += 1;
                elapsed = Duration::ZERO;
            }
        }

        self.ticks += 1;
        Some(elapsed)
    }

    /// Mark the execution as having run its course. It stays registered,
    /// no longer rendered, until the engine retires it.
    pub(crate) fn complete(&mut self) {
        self.completed = true;
        self.transition(ExecutionState::Stopping);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn snapshot(&self, now: Instant) -> ExecutionSnapshot {
        ExecutionSnapshot {
            id: self.id,
            preset_id: self.preset_id.clone(),
            effect: self.effect.kind(),
            state: self.state,
            target_devices: self.target_devices.clone(),
            target_groups: self.target_groups.clone(),
            settings: self.settings.clone(),
            elapsed_ms: now.saturating_duration_since(self.started_at).as_millis() as u64,
            ticks: self.ticks,
            cycles: self.cycles,
        }
    }
}
