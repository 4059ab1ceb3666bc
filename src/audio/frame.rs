//! PCM decoding and fixed-size framing of captured audio

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Wave format errors
#[derive(Error, Debug, PartialEq)]
pub enum FormatError {
    #[error("Unsupported sample format: {bits} bit {encoding:?}")]
    Unsupported { bits: u16, encoding: SampleEncoding },

    #[error("Channel count must be at least 1")]
    NoChannels,

    #[error("Buffer of {len} bytes is not a whole number of {block}-byte sample blocks")]
    Misaligned { len: usize, block: usize },
}

/// How each sample is stored in the byte buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    /// Little-endian integer PCM (8-bit unsigned, wider signed)
    Integer,
    /// Little-endian IEEE float
    Float,
}

/// Format of a captured byte buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl WaveFormat {
    /// 32-bit float, the usual loopback mix format
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            encoding: SampleEncoding::Float,
        }
    }

    /// Signed 16-bit integer PCM
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            encoding: SampleEncoding::Integer,
        }
    }

    fn bytes_per_sample(&self) -> Result<usize, FormatError> {
        match (self.encoding, self.bits_per_sample) {
            (SampleEncoding::Integer, 8 | 16 | 24 | 32) | (SampleEncoding::Float, 32 | 64) => {
                Ok(self.bits_per_sample as usize / 8)
            }
            _ => Err(FormatError::Unsupported {
                bits: self.bits_per_sample,
                encoding: self.encoding,
            }),
        }
    }
}

/// Decode one sample starting at `bytes[0]`, normalized to [-1, 1]
fn decode_sample(bytes: &[u8], format: &WaveFormat) -> f32 {
    let value = match (format.encoding, format.bits_per_sample) {
        (SampleEncoding::Integer, 8) => (bytes[0] as f32 - 128.0) / 128.0,
        (SampleEncoding::Integer, 16) => {
            i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0
        }
        (SampleEncoding::Integer, 24) => {
            // Sign-extend by placing the 24 bits in the top of an i32
            (i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8) as f32 / 8_388_608.0
        }
        (SampleEncoding::Integer, _) => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
        }
        (SampleEncoding::Float, 32) => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        (SampleEncoding::Float, _) => f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) as f32,
    };

    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Convert an interleaved byte buffer to normalized mono samples.
///
/// Channels are averaged. The buffer must hold whole sample blocks
/// (one sample per channel); a partial trailing block is rejected rather
/// than truncated.
pub fn decode_mono(bytes: &[u8], format: &WaveFormat) -> Result<Vec<f32>, FormatError> {
    if format.channels == 0 {
        return Err(FormatError::NoChannels);
    }

    let sample_bytes = format.bytes_per_sample()?;
    let channels = format.channels as usize;
    let block = sample_bytes * channels;

    if bytes.len() % block != 0 {
        return Err(FormatError::Misaligned {
            len: bytes.len(),
            block,
        });
    }

    let mono = bytes
        .chunks_exact(block)
        .map(|frame| {
            let sum: f32 = frame
                .chunks_exact(sample_bytes)
                .map(|s| decode_sample(s, format))
                .sum();
            sum / channels as f32
        })
        .collect();

    Ok(mono)
}

/// One fixed-length block of mono samples.
///
/// Immutable once built; the analysis path consumes it exactly once.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    timestamp: Duration,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, timestamp: Duration) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stream position of the first sample
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// Accumulates mono samples from capture callbacks into fixed-size frames.
///
/// Frames start every `hop_size` samples, so a hop smaller than the frame
/// size yields overlapping frames. Timestamps come from the running sample
/// count rather than the wall clock, which keeps them strictly increasing.
pub struct FrameAssembler {
    frame_size: usize,
    hop_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    /// Stream position (in samples) of `pending[0]`
    position: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, hop_size: usize, sample_rate: u32) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            hop_size: hop_size.clamp(1, frame_size),
            sample_rate: sample_rate.max(1),
            pending: Vec::with_capacity(frame_size * 2),
            position: 0,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Append mono samples, returning every frame that became complete.
    pub fn push(&mut self, mono: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(mono);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.frame_size {
            let samples = self.pending[consumed..consumed + self.frame_size].to_vec();
            let timestamp = Duration::from_secs_f64(
                (self.position + consumed as u64) as f64 / self.sample_rate as f64,
            );
            frames.push(AudioFrame::new(samples, self.sample_rate, timestamp));
            consumed += self.hop_size;
        }

        if consumed > 0 {
            self.pending.drain(..consumed);
            self.position += consumed as u64;
        }

        frames
    }

    /// Decode a raw capture buffer and append it.
    pub fn push_bytes(
        &mut self,
        bytes: &[u8],
        format: &WaveFormat,
    ) -> Result<Vec<AudioFrame>, FormatError> {
        let mono = decode_mono(bytes, format)?;
        Ok(self.push(&mono))
    }

    /// Drop buffered samples, keeping the stream position.
    pub fn clear(&mut self) {
        self.position += self.pending.len() as u64;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn pcm16_stereo_is_averaged_to_mono() {
        let format = WaveFormat::pcm16(48000, 2);
        let mut bytes = Vec::new();
        for (l, r) in [(16384i16, 0i16), (-32768, -32768)] {
            bytes.extend_from_slice(&l.to_le_bytes());
            bytes.extend_from_slice(&r.to_le_bytes());
        }

        let mono = decode_mono(&bytes, &format).unwrap();

        assert_eq!(mono.len(), 2);
        assert_approx(mono[0], 0.25, 1e-4);
        assert_approx(mono[1], -1.0, 1e-4);
    }

    #[test]
    fn pcm24_negative_values_are_sign_extended() {
        let format = WaveFormat {
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 24,
            encoding: SampleEncoding::Integer,
        };
        // -4194304 = 0xC00000 -> -0.5
        let bytes = [0x00, 0x00, 0xC0];

        let mono = decode_mono(&bytes, &format).unwrap();

        assert_approx(mono[0], -0.5, 1e-6);
    }

    #[test]
    fn unsigned_8bit_is_centered() {
        let format = WaveFormat {
            sample_rate: 8000,
            channels: 1,
            bits_per_sample: 8,
            encoding: SampleEncoding::Integer,
        };

        let mono = decode_mono(&[128, 0, 255], &format).unwrap();

        assert_approx(mono[0], 0.0, 1e-6);
        assert_approx(mono[1], -1.0, 1e-6);
        assert!(mono[2] > 0.99);
    }

    #[test]
    fn float_samples_are_clamped_and_nan_silenced() {
        let format = WaveFormat::float32(48000, 1);
        let mut bytes = Vec::new();
        for v in [2.0f32, f32::NAN, -0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let mono = decode_mono(&bytes, &format).unwrap();

        assert_eq!(mono, vec![1.0, 0.0, -0.5]);
    }

    #[test]
    fn unsupported_and_misaligned_buffers_are_rejected() {
        let odd = WaveFormat {
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 12,
            encoding: SampleEncoding::Integer,
        };
        assert!(matches!(
            decode_mono(&[0, 0], &odd),
            Err(FormatError::Unsupported { bits: 12, .. })
        ));

        let stereo = WaveFormat::pcm16(48000, 2);
        assert_eq!(
            decode_mono(&[0, 0, 0], &stereo),
            Err(FormatError::Misaligned { len: 3, block: 4 })
        );

        let none = WaveFormat::pcm16(48000, 0);
        assert_eq!(decode_mono(&[], &none), Err(FormatError::NoChannels));
    }

    #[test]
    fn assembler_emits_fixed_frames_across_callbacks() {
        let mut assembler = FrameAssembler::new(4, 4, 4);

        assert!(assembler.push(&[1.0, 2.0, 3.0]).is_empty());
        let frames = assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[1].samples(), &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(frames[0].timestamp(), Duration::ZERO);
        assert_eq!(frames[1].timestamp(), Duration::from_secs(1));
    }

    #[test]
    fn assembler_overlaps_frames_with_short_hop() {
        let mut assembler = FrameAssembler::new(4, 2, 2);

        let frames = assembler.push(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].samples(), &[2.0, 3.0, 4.0, 5.0]);
        assert_eq!(frames[1].timestamp(), Duration::from_secs(1));
    }
}
