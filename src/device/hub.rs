//! Device registry, group resolution and fire-and-forget dispatch

use super::{CommandKind, DeviceControl, EffectCommand};
use crate::engine::ExecutionId;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

struct DeviceSlot {
    device: Arc<dyn DeviceControl>,
    /// Set while a dispatched batch for this device is still running
    busy: Arc<AtomicBool>,
}

/// Clears a device's busy flag when its batch task ends, however it ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Known devices and groups, plus dispatch to them.
///
/// Each device gets at most one in-flight batch of immediate commands. A
/// batch for a device that is still busy is dropped rather than queued, so a
/// slow device only ever receives the freshest commands. Delayed commands do
/// not hold the device; they wait in their own tasks, which can be cancelled
/// per execution.
pub struct DeviceHub {
    devices: RwLock<HashMap<String, DeviceSlot>>,
    groups: RwLock<HashMap<String, Vec<String>>>,
    scheduled: Mutex<HashMap<ExecutionId, Vec<AbortHandle>>>,
    command_timeout: Duration,
    dropped_batches: Arc<AtomicU64>,
    failed_commands: Arc<AtomicU64>,
}

impl DeviceHub {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
            command_timeout,
            dropped_batches: Arc::new(AtomicU64::new(0)),
            failed_commands: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register (or replace) a device
    pub fn register(&self, id: impl Into<String>, device: Arc<dyn DeviceControl>) {
        let id = id.into();
        log::debug!("Registering device {}", id);
        self.devices.write().insert(
            id,
            DeviceSlot {
                device,
                busy: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.devices.write().remove(id).is_some()
    }

    /// Define (or redefine) a named group of device ids
    pub fn set_group(&self, group_id: impl Into<String>, device_ids: Vec<String>) {
        self.groups.write().insert(group_id.into(), device_ids);
    }

    pub fn remove_group(&self, group_id: &str) -> bool {
        self.groups.write().remove(group_id).is_some()
    }

    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Batches dropped because the device was still busy
    pub fn dropped_batches(&self) -> u64 {
        self.dropped_batches.load(Ordering::Relaxed)
    }

    /// Commands that returned `false` or timed out
    pub fn failed_commands(&self) -> u64 {
        self.failed_commands.load(Ordering::Relaxed)
    }

    /// Expand device and group ids into the registered device ids they name.
    ///
    /// Order follows the input, duplicates are removed and unknown ids are
    /// skipped.
    pub fn resolve_targets(&self, device_ids: &[String], group_ids: &[String]) -> Vec<String> {
        let devices = self.devices.read();
        let groups = self.groups.read();

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        let members = group_ids.iter().flat_map(|group| match groups.get(group) {
            Some(members) => members.as_slice(),
            None => {
                log::debug!("Unknown device group {}", group);
                &[][..]
            }
        });

        for id in device_ids.iter().chain(members) {
            if !devices.contains_key(id) {
                log::debug!("Unknown device {}", id);
                continue;
            }
            if seen.insert(id.as_str()) {
                resolved.push(id.clone());
            }
        }

        resolved
    }

    /// Hand a tick's commands to the devices without waiting for them.
    ///
    /// Commands are grouped per device. A group's immediate commands run in
    /// order as one spawned task while the device is marked busy; its delayed
    /// commands each get their own task that sleeps until due. Must be called
    /// from within a tokio runtime. Returns the number of batches started.
    pub fn dispatch(&self, commands: Vec<EffectCommand>) -> usize {
        let mut batches: HashMap<String, Vec<EffectCommand>> = HashMap::new();
        for command in commands {
            batches.entry(command.target.clone()).or_default().push(command);
        }

        let devices = self.devices.read();
        let mut started = 0;

        for (target, batch) in batches {
            let Some(slot) = devices.get(&target) else {
                log::debug!("Dropping {} commands for unknown device {}", batch.len(), target);
                continue;
            };

            let (immediate, delayed): (Vec<_>, Vec<_>) =
                batch.into_iter().partition(|c| c.delay.is_zero());

            if !immediate.is_empty() {
                if slot
                    .busy
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    log::debug!(
                        "Device {} still busy, dropping {} commands",
                        target,
                        immediate.len() + delayed.len()
                    );
                    self.dropped_batches.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let guard = BusyGuard(slot.busy.clone());
                let device = slot.device.clone();
                let timeout = self.command_timeout;
                let failed = self.failed_commands.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    for command in immediate {
                        deliver(device.as_ref(), &command, timeout, &failed).await;
                    }
                });
            }

            for command in delayed {
                self.schedule(slot.device.clone(), command);
            }
            started += 1;
        }

        started
    }

    fn schedule(&self, device: Arc<dyn DeviceControl>, command: EffectCommand) {
        let owner = command.owner;
        let timeout = self.command_timeout;
        let failed = self.failed_commands.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(command.due()).await;
            deliver(device.as_ref(), &command, timeout, &failed).await;
        });

        if let Some(owner) = owner {
            let mut scheduled = self.scheduled.lock();
            let pending = scheduled.entry(owner).or_default();
            pending.retain(|h| !h.is_finished());
            pending.push(handle.abort_handle());
        }
    }

    /// Abort the delayed commands an execution still has waiting.
    /// Returns how many were cancelled.
    pub fn cancel_scheduled(&self, owner: ExecutionId) -> usize {
        let Some(pending) = self.scheduled.lock().remove(&owner) else {
            return 0;
        };
        let mut cancelled = 0;
        for handle in pending.into_iter().filter(|h| !h.is_finished()) {
            handle.abort();
            cancelled += 1;
        }
        if cancelled > 0 {
            log::debug!("Cancelled {} delayed commands of execution {}", cancelled, owner);
        }
        cancelled
    }

    /// Send one command to one device and wait for the outcome
    pub async fn send(&self, device_id: &str, kind: &CommandKind) -> bool {
        let device = self.devices.read().get(device_id).map(|s| s.device.clone());
        match device {
            Some(device) => send_with_timeout(device.as_ref(), kind, self.command_timeout).await,
            None => {
                log::warn!("Cannot send {:?}: unknown device {}", kind, device_id);
                false
            }
        }
    }

    /// Send the same command to several devices concurrently.
    /// Returns how many succeeded.
    pub async fn broadcast(&self, device_ids: &[String], kind: CommandKind) -> usize {
        let results = join_all(device_ids.iter().map(|id| self.send(id, &kind))).await;
        let ok = results.iter().filter(|ok| **ok).count();
        if ok < device_ids.len() {
            log::warn!(
                "{:?} reached {} of {} devices",
                kind,
                ok,
                device_ids.len()
            );
        }
        ok
    }

    /// Connect a registered device to its address
    pub async fn connect(&self, device_id: &str, address: &str) -> bool {
        let device = self.devices.read().get(device_id).map(|s| s.device.clone());
        let Some(device) = device else {
            log::warn!("Cannot connect unknown device {}", device_id);
            return false;
        };

        match tokio::time::timeout(self.command_timeout, device.connect(address)).await {
            Ok(true) => {
                log::info!("Connected {} at {}", device_id, address);
                true
            }
            Ok(false) => {
                log::warn!("Device {} refused connection at {}", device_id, address);
                false
            }
            Err(_) => {
                log::warn!("Connecting {} at {} timed out", device_id, address);
                false
            }
        }
    }

    /// Disconnect every registered device
    pub async fn disconnect_all(&self) -> usize {
        let devices: Vec<Arc<dyn DeviceControl>> =
            self.devices.read().values().map(|s| s.device.clone()).collect();
        let timeout = self.command_timeout;

        let results = join_all(
            devices
                .iter()
                .map(|d| async move { tokio::time::timeout(timeout, d.disconnect()).await }),
        )
        .await;

        results.into_iter().filter(|r| matches!(r, Ok(true))).count()
    }
}

async fn deliver(
    device: &dyn DeviceControl,
    command: &EffectCommand,
    timeout: Duration,
    failed: &AtomicU64,
) {
    if !send_with_timeout(device, &command.kind, timeout).await {
        log::warn!("Device {} failed {:?}", command.target, command.kind);
        failed.fetch_add(1, Ordering::Relaxed);
    }
}

async fn send_with_timeout(
    device: &dyn DeviceControl,
    kind: &CommandKind,
    timeout: Duration,
) -> bool {
    match tokio::time::timeout(timeout, kind.apply(device)).await {
        Ok(ok) => ok,
        Err(_) => {
            log::debug!("{:?} timed out after {:?}", kind, timeout);
            false
        }
    }
}
