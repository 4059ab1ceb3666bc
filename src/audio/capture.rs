//! Audio capture implementation using a dedicated thread

use super::{AudioConfig, FrameAssembler, FrameQueue, SampleEncoding, SourceId, WaveFormat};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No output device found")]
    NoOutputDevice,

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Commands sent to the audio thread
enum AudioCommand {
    Stop,
}

/// Audio capture handle (Send + Sync safe)
///
/// This struct doesn't contain the cpal::Stream directly.
/// Instead, it manages a dedicated thread that owns the stream and pushes
/// fixed-size frames into the shared queue.
pub struct AudioCaptureHandle {
    /// Command sender to control the audio thread
    command_tx: mpsc::Sender<AudioCommand>,

    /// Handle to the audio thread
    thread_handle: Option<JoinHandle<()>>,

    /// Format reported by the device once the stream is running
    format: Arc<Mutex<Option<WaveFormat>>>,
}

impl AudioCaptureHandle {
    /// Start capturing from `source_id` into `queue`.
    ///
    /// `source_id` is parsed with [`SourceId::parse`]; `None` captures
    /// system audio.
    pub fn new(
        source_id: Option<String>,
        config: &AudioConfig,
        queue: Arc<FrameQueue>,
    ) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let format = Arc::new(Mutex::new(None));
        let format_clone = format.clone();
        let frame_size = config.fft_size;
        let hop_size = config.hop_size;

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_audio_thread(
                    source_id,
                    command_rx,
                    queue,
                    format_clone,
                    frame_size,
                    hop_size,
                ) {
                    log::error!("Audio thread error: {}", e);
                }
            })
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
            format,
        })
    }

    /// Wave format of the running stream, if it has started
    pub fn format(&self) -> Option<WaveFormat> {
        self.format.lock().clone()
    }

    /// Stop the audio capture
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map a cpal sample format onto the byte layout the decoder understands
fn wave_format_for(
    sample_format: SampleFormat,
    sample_rate: u32,
    channels: u16,
) -> Result<WaveFormat, CaptureError> {
    let (bits_per_sample, encoding) = match sample_format {
        SampleFormat::U8 => (8, SampleEncoding::Integer),
        SampleFormat::I16 => (16, SampleEncoding::Integer),
        SampleFormat::I32 => (32, SampleEncoding::Integer),
        SampleFormat::F32 => (32, SampleEncoding::Float),
        SampleFormat::F64 => (64, SampleEncoding::Float),
        other => return Err(CaptureError::UnsupportedFormat(format!("{:?}", other))),
    };

    Ok(WaveFormat {
        sample_rate,
        channels,
        bits_per_sample,
        encoding,
    })
}

fn find_by_name<I>(devices: Result<I, cpal::DevicesError>, name: &str) -> Result<Device, CaptureError>
where
    I: Iterator<Item = Device>,
{
    devices
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| CaptureError::SourceNotFound(name.to_string()))
}

/// Find the cpal device behind a source id
fn select_device(host: &cpal::Host, source: &SourceId) -> Result<Device, CaptureError> {
    match source {
        SourceId::SystemAudio => {
            log::info!("Using default output device for system audio loopback");
            host.default_output_device()
                .ok_or(CaptureError::NoOutputDevice)
        }
        SourceId::Output(name) => {
            log::info!("Using output device for loopback: {}", name);
            find_by_name(host.output_devices(), name)
        }
        SourceId::Input(name) => {
            log::info!("Using input device: {}", name);
            find_by_name(host.input_devices(), name)
        }
    }
}

/// Run the audio capture in a dedicated thread
fn run_audio_thread(
    source_id: Option<String>,
    command_rx: mpsc::Receiver<AudioCommand>,
    queue: Arc<FrameQueue>,
    format_out: Arc<Mutex<Option<WaveFormat>>>,
    frame_size: usize,
    hop_size: usize,
) -> Result<(), CaptureError> {
    let host = cpal::default_host();
    let source = SourceId::parse(source_id.as_deref());
    let device = select_device(&host, &source)?;

    // For loopback, query the output config (what the device is producing)
    let config = if source.is_loopback() {
        device
            .default_output_config()
            .map_err(|e| CaptureError::ConfigError(format!("Loopback config: {}", e)))?
    } else {
        device
            .default_input_config()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?
    };

    let format = wave_format_for(
        config.sample_format(),
        config.sample_rate().0,
        config.channels(),
    )?;

    log::info!(
        "Audio capture: {} Hz, {} channels, {}-bit {:?}",
        format.sample_rate,
        format.channels,
        format.bits_per_sample,
        format.encoding
    );

    let mut assembler = FrameAssembler::new(frame_size, hop_size, format.sample_rate);
    let callback_format = format.clone();

    // The callback hands over raw bytes; decoding and framing happen here so
    // the analysis thread only ever sees complete frames.
    let stream = device
        .build_input_stream_raw(
            &config.config(),
            config.sample_format(),
            move |data: &cpal::Data, _: &cpal::InputCallbackInfo| {
                match assembler.push_bytes(data.bytes(), &callback_format) {
                    Ok(frames) => {
                        for frame in frames {
                            queue.push(frame);
                        }
                    }
                    Err(e) => {
                        log::warn!("Dropping capture buffer: {}", e);
                        assembler.clear();
                    }
                }
            },
            |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayError(e.to_string()))?;

    *format_out.lock() = Some(format);
    log::info!("Audio capture started");

    // The stream runs on cpal's callback thread; this thread just keeps it
    // alive until told to stop.
    match command_rx.recv() {
        Ok(AudioCommand::Stop) => log::info!("Audio capture stopping"),
        Err(_) => log::info!("Audio capture channel disconnected"),
    }

    drop(stream);
    *format_out.lock() = None;
    Ok(())
}
