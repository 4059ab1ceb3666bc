//! Ordered analysis chain running on its own thread

use super::{
    Aggregator, AnalysisError, AnalysisResult, AudioConfig, AudioFrame, BeatDetector,
    CaptureError, FrameQueue, PartialAnalysis, SpectralAnalyzer, TempoEstimator,
};
use crate::state::LatestAnalysis;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long the worker waits for a frame before checking commands again
const FRAME_WAIT: Duration = Duration::from_millis(50);

/// Commands sent to the analysis thread
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCommand {
    SetBeatThreshold(f32),
    SetBeatSensitivity(f32),
    /// External tempo hint, e.g. from playback metadata
    TempoHint(f32),
    Stop,
}

/// Spectral analysis, beat detection, tempo estimation and aggregation for
/// one stream. Frames must be fed in arrival order.
pub struct AnalysisWorker {
    analyzer: SpectralAnalyzer,
    beats: BeatDetector,
    tempo: TempoEstimator,
    aggregator: Aggregator,
}

impl AnalysisWorker {
    pub fn new(config: &AudioConfig) -> Result<Self, AnalysisError> {
        Ok(Self {
            analyzer: SpectralAnalyzer::new(config)?,
            beats: BeatDetector::new(&config.beat),
            tempo: TempoEstimator::new(&config.tempo),
            aggregator: Aggregator::new(config.classifier.clone()),
        })
    }

    /// Run one frame through the whole chain
    pub fn process(&mut self, frame: &AudioFrame) -> Result<AnalysisResult, AnalysisError> {
        let features = self.analyzer.analyze(frame)?;

        let decision = self.beats.detect(features.volume, frame.timestamp());
        if decision.detected {
            self.tempo.update(frame.timestamp());
        }
        let rhythm = self.tempo.estimate();

        if features.volume == 0.0 {
            self.aggregator.clear_signal();
        }

        let rhythm_partial = PartialAnalysis {
            beat_detected: Some(decision.detected),
            beat_intensity: Some(decision.intensity),
            bpm: Some(rhythm.bpm),
            rhythm_regularity: Some(rhythm.regularity),
            rhythm_complexity: Some(rhythm.complexity),
            ..Default::default()
        };

        Ok(self
            .aggregator
            .combine(&[features.to_partial(), rhythm_partial]))
    }

    /// Apply a runtime command. Returns false for `Stop`.
    pub fn apply(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::SetBeatThreshold(t) => self.beats.set_threshold(t),
            WorkerCommand::SetBeatSensitivity(s) => self.beats.set_sensitivity(s),
            WorkerCommand::TempoHint(bpm) => self.tempo.apply_hint(bpm),
            WorkerCommand::Stop => return false,
        }
        true
    }

    /// Move the worker onto a dedicated thread that drains `queue` into `latest`
    pub fn spawn(
        self,
        queue: Arc<FrameQueue>,
        latest: LatestAnalysis,
    ) -> Result<WorkerHandle, CaptureError> {
        let (command_tx, command_rx) = unbounded();

        let thread_handle = thread::Builder::new()
            .name("audio-analysis".to_string())
            .spawn(move || run_analysis_thread(self, queue, latest, command_rx))
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        Ok(WorkerHandle {
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }
}

fn run_analysis_thread(
    mut worker: AnalysisWorker,
    queue: Arc<FrameQueue>,
    latest: LatestAnalysis,
    command_rx: Receiver<WorkerCommand>,
) {
    log::info!("Analysis worker started");

    'outer: loop {
        loop {
            match command_rx.try_recv() {
                Ok(command) => {
                    if !worker.apply(command) {
                        break 'outer;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'outer,
            }
        }

        let Some(frame) = queue.recv_timeout(FRAME_WAIT) else {
            continue;
        };

        match worker.process(&frame) {
            Ok(result) => latest.publish(result),
            Err(e) => log::debug!("Skipping frame at {:?}: {}", frame.timestamp(), e),
        }
    }

    log::info!("Analysis worker stopped");
}

/// Control handle for a running analysis thread
pub struct WorkerHandle {
    command_tx: Sender<WorkerCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, command: WorkerCommand) {
        let _ = self.command_tx.send(command);
    }

    pub fn set_beat_threshold(&self, threshold: f32) {
        self.send(WorkerCommand::SetBeatThreshold(threshold));
    }

    pub fn set_beat_sensitivity(&self, sensitivity: f32) {
        self.send(WorkerCommand::SetBeatSensitivity(sensitivity));
    }

    pub fn hint_tempo(&self, bpm: f32) {
        self.send(WorkerCommand::TempoHint(bpm));
    }

    /// Stop the thread and wait for it to finish
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
