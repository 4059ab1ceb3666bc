//! Bounded frame hand-off between capture and analysis

use super::AudioFrame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bounded queue that evicts the oldest frame when full.
///
/// The capture callback must never block, and analysis should always work
/// on the freshest audio, so a full queue makes room at the front instead
/// of rejecting the new frame.
pub struct FrameQueue {
    tx: Sender<AudioFrame>,
    rx: Receiver<AudioFrame>,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame, dropping the oldest queued frame if necessary.
    pub fn push(&self, frame: AudioFrame) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if total % 100 == 1 {
                            log::warn!("Analysis falling behind, {} frames dropped so far", total);
                        }
                    }
                    frame = rejected;
                }
                // Both ends live in `self`, so this cannot happen while we exist.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Wait up to `timeout` for the next frame in arrival order.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total frames evicted because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
