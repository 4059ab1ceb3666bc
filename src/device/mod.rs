//! Device control contract and the commands the engine sends through it

mod console;
mod hub;
#[cfg(test)]
pub(crate) mod recording;

pub use console::ConsoleDevice;
pub use hub::DeviceHub;

use crate::effects::Rgb;
use crate::engine::ExecutionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Vendor-neutral light control.
///
/// Every call reports success as a `bool` and never panics across the
/// boundary; callers treat `false` as "best effort, keep going".
#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn connect(&self, address: &str) -> bool;
    async fn disconnect(&self) -> bool;
    async fn set_color(&self, r: u8, g: u8, b: u8) -> bool;
    async fn set_brightness(&self, level: u8) -> bool;
    async fn set_effect(&self, name: &str) -> bool;
    async fn turn_on(&self) -> bool;
    async fn turn_off(&self) -> bool;
}

/// What a command asks a device to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CommandKind {
    SetColor(Rgb),
    SetBrightness(u8),
    SetEffect(String),
    TurnOn,
    TurnOff,
}

impl CommandKind {
    /// Run this command against a device
    pub async fn apply(&self, device: &dyn DeviceControl) -> bool {
        match self {
            CommandKind::SetColor(c) => device.set_color(c.r, c.g, c.b).await,
            CommandKind::SetBrightness(level) => device.set_brightness(*level).await,
            CommandKind::SetEffect(name) => device.set_effect(name).await,
            CommandKind::TurnOn => device.turn_on().await,
            CommandKind::TurnOff => device.turn_off().await,
        }
    }
}

/// One command for one device, produced by a tick
#[derive(Debug, Clone, PartialEq)]
pub struct EffectCommand {
    /// Device id the command is addressed to
    pub target: String,
    pub kind: CommandKind,
    /// Delay after `issued_at` before the command is sent
    pub delay: Duration,
    pub issued_at: Instant,
    /// Execution that produced the command; its delayed commands are
    /// cancelled together
    pub owner: Option<ExecutionId>,
}

impl EffectCommand {
    /// When the command should reach the device
    pub fn due(&self) -> Instant {
        self.issued_at + self.delay
    }
}
