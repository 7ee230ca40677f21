//! Audio playback of synthesized speech
//!
//! Speech arrives as raw 16-bit PCM; it is decoded into a [`PcmBuffer`] and
//! handed to an [`AudioSink`]. The production sink plays through cpal.

pub mod output;
pub mod resampler;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use output::CpalSink;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No output device available: {0}")]
    NoDevice(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Interleaved f32 samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode signed 16-bit little-endian PCM to f32.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Destination for decoded audio.
///
/// `play` resolves once playback has started; it does not wait for the
/// buffer to finish.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, buffer: PcmBuffer) -> Result<(), AudioError>;
}
