//! LightSync Library
//!
//! Real-time audio analysis driving smart lights: capture is framed and
//! analyzed on dedicated threads, the newest result lands in a shared slot,
//! and a fixed-rate effect engine turns it into device commands.

pub mod audio;
pub mod config;
pub mod device;
pub mod effects;
pub mod engine;
pub mod state;

use audio::{AnalysisError, AnalysisWorker, AudioCaptureHandle, CaptureError, FrameQueue, WorkerHandle};
use config::Settings;
use device::DeviceHub;
use engine::{EngineTask, PresetEngine};
use state::LatestAnalysis;

use std::sync::Arc;
use thiserror::Error;

/// Pipeline start-up errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Analysis setup failed: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Running capture, analysis and effect loop.
///
/// Dropping it stops the threads; [`shutdown`](Self::shutdown) also stops the
/// effect loop cleanly.
pub struct Pipeline {
    capture: Option<AudioCaptureHandle>,
    worker: Option<WorkerHandle>,
    queue: Arc<FrameQueue>,
    latest: LatestAnalysis,
    engine: Arc<PresetEngine>,
    engine_task: Option<EngineTask>,
}

impl Pipeline {
    /// Start analysis and the effect loop, capturing from `source_id` when
    /// `capture` is true. Must be called from within a tokio runtime.
    pub fn start(
        settings: &Settings,
        hub: Arc<DeviceHub>,
        source_id: Option<String>,
        capture: bool,
    ) -> Result<Self, PipelineError> {
        let queue = Arc::new(FrameQueue::new(settings.audio.queue_capacity));
        let latest = LatestAnalysis::new();

        let worker = AnalysisWorker::new(&settings.audio)?.spawn(queue.clone(), latest.clone())?;

        let capture = if capture {
            Some(AudioCaptureHandle::new(source_id, &settings.audio, queue.clone())?)
        } else {
            None
        };

        let engine = Arc::new(PresetEngine::new(
            settings.engine.clone(),
            hub,
            latest.clone(),
        ));
        let engine_task = engine.spawn();

        Ok(Self {
            capture,
            worker: Some(worker),
            queue,
            latest,
            engine,
            engine_task: Some(engine_task),
        })
    }

    pub fn engine(&self) -> &Arc<PresetEngine> {
        &self.engine
    }

    pub fn latest(&self) -> &LatestAnalysis {
        &self.latest
    }

    /// Frames feed point, for sources other than the capture thread
    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    pub fn worker(&self) -> Option<&WorkerHandle> {
        self.worker.as_ref()
    }

    /// Stop the effect loop (and every execution), then analysis and capture
    pub async fn shutdown(mut self) {
        if let Some(task) = self.engine_task.take() {
            task.shutdown().await;
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        log::info!(
            "Pipeline stopped ({} results, {} frames dropped)",
            self.latest.updates(),
            self.queue.dropped()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::device::recording::RecordingDevice;
    use crate::engine::{PresetDefinition, StartRequest};
    use std::time::{Duration, Instant};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn frames_flow_from_queue_to_devices() {
        let mut settings = Settings::default();
        settings.engine.tick_interval_ms = 10;

        let hub = Arc::new(DeviceHub::new(settings.engine.command_timeout()));
        let device = Arc::new(RecordingDevice::new());
        hub.register("desk", device.clone());

        let pipeline = Pipeline::start(&settings, hub, None, false).unwrap();
        pipeline
            .engine()
            .start(StartRequest::new(PresetDefinition::new("volume").with_devices(["desk"])))
            .await
            .unwrap();

        let samples: Vec<f32> = (0..1024)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        pipeline
            .queue()
            .push(AudioFrame::new(samples, 44100, Duration::ZERO));

        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.latest().updates() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pipeline.latest().updates(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!device.commands().is_empty());
        pipeline.shutdown().await;
    }
}
