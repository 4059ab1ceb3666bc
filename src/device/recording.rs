//! In-memory device used by tests

use super::{CommandKind, DeviceControl};
use crate::effects::Rgb;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Records every call. Can be made slow or failing.
#[derive(Default)]
pub struct RecordingDevice {
    commands: Mutex<Vec<CommandKind>>,
    connected_to: Mutex<Option<String>>,
    latency: Duration,
    fail: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<CommandKind> {
        self.commands.lock().clone()
    }

    pub fn connected_to(&self) -> Option<String> {
        self.connected_to.lock().clone()
    }

    async fn record(&self, kind: CommandKind) -> bool {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.commands.lock().push(kind);
        !self.fail
    }
}

#[async_trait]
impl DeviceControl for RecordingDevice {
    async fn connect(&self, address: &str) -> bool {
        *self.connected_to.lock() = Some(address.to_string());
        !self.fail
    }

    async fn disconnect(&self) -> bool {
        self.connected_to.lock().take().is_some()
    }

    async fn set_color(&self, r: u8, g: u8, b: u8) -> bool {
        self.record(CommandKind::SetColor(Rgb::new(r, g, b))).await
    }

    async fn set_brightness(&self, level: u8) -> bool {
        self.record(CommandKind::SetBrightness(level)).await
    }

    async fn set_effect(&self, name: &str) -> bool {
        self.record(CommandKind::SetEffect(name.to_string())).await
    }

    async fn turn_on(&self) -> bool {
        self.record(CommandKind::TurnOn).await
    }

    async fn turn_off(&self) -> bool {
        self.record(CommandKind::TurnOff).await
    }
}
