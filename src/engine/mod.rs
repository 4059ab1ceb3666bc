//! Preset execution engine
//!
//! Runs presets as executions. A fixed-rate tick reads the latest analysis
//! result, renders each active execution's effect and hands the resulting
//! commands to the [`DeviceHub`] without waiting on the devices. Start and
//! stop are serialized so a preset id never has two active executions.

mod context;
mod registry;

pub use context::{
    ExecutionContext, ExecutionEvent, ExecutionId, ExecutionSettings, ExecutionSnapshot,
    ExecutionState, PresetDefinition, StartRequest, StopReason,
};
pub use registry::ExecutionRegistry;

use crate::device::{CommandKind, DeviceHub, EffectCommand};
use crate::effects::{Effect, EffectKind, ParamError};
use crate::state::LatestAnalysis;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Engine timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Effect tick period
    pub tick_interval_ms: u64,

    /// Upper bound for a single device call
    pub command_timeout_ms: u64,

    /// Maximum run time of a preview execution
    pub preview_duration_ms: u64,

    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            command_timeout_ms: 250,
            preview_duration_ms: 10_000,
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn preview_duration(&self) -> Duration {
        Duration::from_millis(self.preview_duration_ms)
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Preset id must not be empty")]
    EmptyPresetId,

    #[error("Invalid parameters for preset {preset_id}: {source}")]
    InvalidParameters {
        preset_id: String,
        #[source]
        source: ParamError,
    },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("No active execution for preset {0}")]
    NoActiveExecution(String),
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Executions rendered
    pub executions: usize,
    /// Commands handed to devices after fan-out
    pub commands: usize,
    /// Executions that ran their course and await [`PresetEngine::reap`]
    pub completed: usize,
}

pub struct PresetEngine {
    config: EngineConfig,
    registry: ExecutionRegistry,
    hub: Arc<DeviceHub>,
    analysis: LatestAnalysis,
    /// Serializes start and stop
    control: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ExecutionEvent>,
}

impl PresetEngine {
    pub fn new(config: EngineConfig, hub: Arc<DeviceHub>, analysis: LatestAnalysis) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            registry: ExecutionRegistry::new(),
            hub,
            analysis,
            control: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<DeviceHub> {
        &self.hub
    }

    /// Receive started/stopped notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub fn active_executions(&self) -> Vec<ExecutionSnapshot> {
        self.registry.list(Instant::now())
    }

    /// Start a preset, superseding any active execution of the same preset id
    pub async fn start(&self, request: StartRequest) -> Result<ExecutionId, EngineError> {
        if request.preset.id.trim().is_empty() {
            return Err(EngineError::EmptyPresetId);
        }

        let kind = EffectKind::resolve(request.preset.kind.as_deref(), &request.preset.id);
        let effect = Effect::from_params(kind, &request.merged_parameters()).map_err(|source| {
            EngineError::InvalidParameters {
                preset_id: request.preset.id.clone(),
                source,
            }
        })?;

        let _control = self.control.lock().await;

        let mut ctx = ExecutionContext::new(
            request,
            effect,
            self.config.preview_duration(),
            Instant::now(),
        );
        ctx.transition(ExecutionState::Starting);

        if let Some(previous) = self.registry.remove_preset(ctx.preset_id()) {
            log::info!(
                "Execution {} supersedes {} for preset {}",
                ctx.id(),
                previous.id(),
                previous.preset_id()
            );
            let reason = stop_reason(&previous, StopReason::Superseded);
            retire(&self.hub, &self.events, previous, reason).await;
        }

        let targets = self
            .hub
            .resolve_targets(ctx.target_devices(), ctx.target_groups());
        if ctx.settings().power_on {
            self.hub.broadcast(&targets, CommandKind::TurnOn).await;
        }
        if let Some(name) = &ctx.settings().effect {
            self.hub
                .broadcast(&targets, CommandKind::SetEffect(name.clone()))
                .await;
        }

        ctx.reset_clock(Instant::now());
        ctx.transition(ExecutionState::Active);

        let id = ctx.id();
        let preset_id = ctx.preset_id().to_string();
        log::info!("Started execution {} of preset {} ({})", id, preset_id, kind);

        if let Some(stale) = self.registry.register(ctx) {
            let reason = stop_reason(&stale, StopReason::Superseded);
            retire(&self.hub, &self.events, stale, reason).await;
        }

        let _ = self.events.send(ExecutionEvent::Started {
            id,
            preset_id,
            effect: kind,
        });
        Ok(id)
    }

    /// Stop one execution by id
    pub async fn stop(&self, id: ExecutionId) -> Result<ExecutionSnapshot, EngineError> {
        let _control = self.control.lock().await;
        let ctx = self
            .registry
            .remove(id)
            .ok_or(EngineError::ExecutionNotFound(id))?;
        let reason = stop_reason(&ctx, StopReason::Requested);
        Ok(retire(&self.hub, &self.events, ctx, reason).await)
    }

    /// Stop the active execution of a preset
    pub async fn stop_preset(&self, preset_id: &str) -> Result<ExecutionSnapshot, EngineError> {
        let _control = self.control.lock().await;
        let ctx = self
            .registry
            .remove_preset(preset_id)
            .ok_or_else(|| EngineError::NoActiveExecution(preset_id.to_string()))?;
        let reason = stop_reason(&ctx, StopReason::Requested);
        Ok(retire(&self.hub, &self.events, ctx, reason).await)
    }

    /// Stop everything. Returns how many executions were stopped.
    pub async fn stop_all(&self) -> usize {
        let _control = self.control.lock().await;
        let drained = self.registry.drain();
        let count = drained.len();
        for ctx in drained {
            let reason = stop_reason(&ctx, StopReason::Shutdown);
            retire(&self.hub, &self.events, ctx, reason).await;
        }
        count
    }

    /// Retire executions that ran their course. Serialized with start and
    /// stop, so a restart of the same preset either retires them first or
    /// waits until they are gone. Returns how many were retired.
    pub async fn reap(&self) -> usize {
        let _control = self.control.lock().await;
        let completed = self.registry.remove_completed();
        let count = completed.len();
        for ctx in completed {
            log::info!(
                "Execution {} of preset {} completed",
                ctx.id(),
                ctx.preset_id()
            );
            retire(&self.hub, &self.events, ctx, StopReason::Completed).await;
        }
        count
    }

    /// Render every active execution once and dispatch the commands.
    ///
    /// Must be called from within a tokio runtime. Executions whose run time
    /// is over are marked completed and left for [`reap`](Self::reap).
    pub fn tick(&self) -> TickReport {
        let analysis = self.analysis.latest();
        let now = Instant::now();
        let mut commands = Vec::new();
        let mut report = TickReport::default();

        self.registry.for_each_active(|ctx| {
            let Some(elapsed) = ctx.advance(now) else {
                ctx.complete();
                report.completed += 1;
                return;
            };

            let steps = ctx.effect().render(&analysis, elapsed);
            let targets = self
                .hub
                .resolve_targets(ctx.target_devices(), ctx.target_groups());

            for target in &targets {
                for step in &steps {
                    commands.push(EffectCommand {
                        target: target.clone(),
                        kind: step.kind.clone(),
                        delay: step.delay,
                        issued_at: now,
                        owner: Some(ctx.id()),
                    });
                }
            }

            report.executions += 1;
        });

        report.commands = commands.len();
        if !commands.is_empty() {
            self.hub.dispatch(commands);
        }

        report
    }

    /// Tick loop: runs until `shutdown_rx` fires or its sender is dropped,
    /// then stops every execution.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        // An overrunning tick skips the next one instead of queueing it
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Effect loop started ({:?} tick)", self.config.tick_interval());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    log::info!("Effect loop received shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick();
                    log::trace!(
                        "Tick: {} executions, {} commands",
                        report.executions,
                        report.commands
                    );
                    if report.completed > 0 {
                        self.reap().await;
                    }
                }
            }
        }

        let stopped = self.stop_all().await;
        log::info!("Effect loop stopped ({} executions stopped)", stopped);
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn(self: &Arc<Self>) -> EngineTask {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(self.clone().run(shutdown_rx));
        EngineTask {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a spawned tick loop
pub struct EngineTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl EngineTask {
    /// Signal the loop and wait until it has stopped every execution
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            log::error!("Effect loop task failed: {}", e);
        }
    }
}

fn stop_reason(ctx: &ExecutionContext, otherwise: StopReason) -> StopReason {
    if ctx.is_completed() {
        StopReason::Completed
    } else {
        otherwise
    }
}

/// Finish an execution that has already left the registry
async fn retire(
    hub: &DeviceHub,
    events: &broadcast::Sender<ExecutionEvent>,
    mut ctx: ExecutionContext,
    reason: StopReason,
) -> ExecutionSnapshot {
    ctx.transition(ExecutionState::Stopping);
    hub.cancel_scheduled(ctx.id());

    if ctx.settings().power_off_on_stop {
        let targets = hub.resolve_targets(ctx.target_devices(), ctx.target_groups());
        hub.broadcast(&targets, CommandKind::TurnOff).await;
    }

    ctx.transition(ExecutionState::Stopped);
    log::info!(
        "Stopped execution {} of preset {} ({:?})",
        ctx.id(),
        ctx.preset_id(),
        reason
    );

    let _ = events.send(ExecutionEvent::Stopped {
        id: ctx.id(),
        preset_id: ctx.preset_id().to_string(),
        reason,
    });
    ctx.snapshot(Instant::now())
}
