//! Device that only logs what it is asked to do

use super::DeviceControl;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Log sink standing in for a real light. Useful for dry runs.
pub struct ConsoleDevice {
    name: String,
    address: Mutex<Option<String>>,
}

impl ConsoleDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.address.lock().is_some()
    }
}

#[async_trait]
impl DeviceControl for ConsoleDevice {
    async fn connect(&self, address: &str) -> bool {
        log::info!("[{}] connect {}", self.name, address);
        *self.address.lock() = Some(address.to_string());
        true
    }

    async fn disconnect(&self) -> bool {
        log::info!("[{}] disconnect", self.name);
        self.address.lock().take().is_some()
    }

    async fn set_color(&self, r: u8, g: u8, b: u8) -> bool {
        log::info!("[{}] color #{:02x}{:02x}{:02x}", self.name, r, g, b);
        true
    }

    async fn set_brightness(&self, level: u8) -> bool {
        log::info!("[{}] brightness {}", self.name, level);
        true
    }

    async fn set_effect(&self, name: &str) -> bool {
        log::info!("[{}] effect {}", self.name, name);
        true
    }

    async fn turn_on(&self) -> bool {
        log::info!("[{}] on", self.name);
        true
    }

    async fn turn_off(&self) -> bool {
        log::info!("[{}] off", self.name);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_and_disconnect_track_the_address() {
        let device = ConsoleDevice::new("desk");
        assert!(!device.is_connected());

        assert!(device.connect("127.0.0.1").await);
        assert!(device.is_connected());
        assert!(device.set_brightness(10).await);

        assert!(device.disconnect().await);
        assert!(!device.disconnect().await);
        assert_eq!(device.name(), "desk");
    }
}
