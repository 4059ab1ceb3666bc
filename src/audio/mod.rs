//! Audio capture and analysis module

mod analysis;
mod beat;
mod capture;
mod classify;
mod fft;
mod frame;
mod queue;
mod sources;
mod tempo;
mod worker;

pub use analysis::{AnalysisResult, Genre, Mood, PartialAnalysis};
pub use beat::{BeatConfig, BeatDecision, BeatDetector};
pub use capture::{AudioCaptureHandle, CaptureError};
pub use classify::{Aggregator, ClassifierThresholds};
pub use fft::{AnalysisError, SpectralAnalyzer, SpectralFeatures};
pub use frame::{decode_mono, AudioFrame, FormatError, FrameAssembler, SampleEncoding, WaveFormat};
pub use queue::FrameQueue;
pub use sources::{list_sources, AudioSource, SourceError, SourceId, SourceType};
pub use tempo::{RhythmEstimate, TempoConfig, TempoEstimator};
pub use worker::{AnalysisWorker, WorkerCommand, WorkerHandle};

use serde::{Deserialize, Serialize};

/// Audio processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// FFT window size, must be a power of two
    pub fft_size: usize,

    /// Number of equal-width bands over the half spectrum
    pub band_count: usize,

    /// Samples between the starts of two consecutive frames
    pub hop_size: usize,

    /// Frames buffered between capture and analysis before the oldest is dropped
    pub queue_capacity: usize,

    /// Beat detection tuning
    pub beat: BeatConfig,

    /// Tempo estimation tuning
    pub tempo: TempoConfig,

    /// Mood/genre heuristics
    pub classifier: ClassifierThresholds,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 1024,
            band_count: 10,
            hop_size: 1024,
            queue_capacity: 4,
            beat: BeatConfig::default(),
            tempo: TempoConfig::default(),
            classifier: ClassifierThresholds::default(),
        }
    }
}
