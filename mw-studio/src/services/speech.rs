//! Speech synthesis of listening scripts
//!
//! The text-to-speech model returns raw signed 16-bit little-endian PCM at
//! 24 kHz mono, base64-encoded in the first response part.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::debug;

use crate::audio::{decode_pcm16_le, AudioError, AudioSink, PcmBuffer};
use crate::gemini::{GeminiError, GenerateContentRequest, GenerationConfig, GenerativeBackend, Part};

pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error(transparent)]
    Backend(#[from] GeminiError),

    #[error("No audio data returned")]
    NoAudioData,

    #[error("Invalid audio payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Output(#[from] AudioError),
}

pub struct SpeechSynthesizer {
    backend: Arc<dyn GenerativeBackend>,
    sink: Arc<dyn AudioSink>,
    model: String,
    voice: String,
}

impl SpeechSynthesizer {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        sink: Arc<dyn AudioSink>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            sink,
            model: model.into(),
            voice: voice.into(),
        }
    }

    pub fn build_request(text: &str, voice: &str) -> GenerateContentRequest {
        GenerateContentRequest::user(vec![Part::text(format!(
            "Read this Spanish text clearly and naturally: {}",
            text
        ))])
        .with_config(GenerationConfig::audio(voice))
    }

    /// Synthesize `text` and start playing it.
    ///
    /// Returns once playback has started.
    pub async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        debug!(model = %self.model, voice = %self.voice, chars = text.chars().count(), "Synthesizing speech");

        let request = Self::build_request(text, &self.voice);
        let response = self.backend.generate_content(&self.model, &request).await?;

        let inline = response.first_inline_data().ok_or(SpeechError::NoAudioData)?;
        let buffer = decode_speech(&inline.data)?;
        if buffer.is_empty() {
            return Err(SpeechError::NoAudioData);
        }

        self.sink.play(buffer).await?;
        Ok(())
    }
}

/// Decode a base64 PCM payload into a playable buffer
pub fn decode_speech(base64: &str) -> Result<PcmBuffer, SpeechError> {
    let bytes = STANDARD
        .decode(base64.as_bytes())
        .map_err(|e| SpeechError::Decode(e.to_string()))?;

    Ok(PcmBuffer {
        samples: decode_pcm16_le(&bytes),
        sample_rate: SPEECH_SAMPLE_RATE,
        channels: SPEECH_CHANNELS,
    })
}
