//! Shared test fixtures: in-process fakes for the AI backend and audio sink

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use mw_common::config::{ModelConfig, TomlConfig};
use mw_studio::audio::{AudioError, AudioSink, PcmBuffer};
use mw_studio::gemini::{
    GeminiError, GenerateContentRequest, GenerateContentResponse, GenerativeBackend,
};
use mw_studio::{AppState, Studio};
use tokio::sync::Notify;

pub const METADATA_MODEL: &str = "test-metadata";
pub const GENERATION_MODEL: &str = "test-generation";
pub const SPEECH_MODEL: &str = "test-speech";

pub fn test_config() -> TomlConfig {
    TomlConfig {
        models: ModelConfig {
            metadata: METADATA_MODEL.to_string(),
            generation: GENERATION_MODEL.to_string(),
            speech: SPEECH_MODEL.to_string(),
        },
        max_upload_bytes: 1024 * 1024,
        ..Default::default()
    }
}

/// Scripted backend: replies are queued per model and every call is recorded
#[derive(Default)]
pub struct FakeBackend {
    replies: Mutex<HashMap<String, VecDeque<Result<GenerateContentResponse, GeminiError>>>>,
    calls: Mutex<Vec<(String, GenerateContentRequest)>>,
    /// When set, calls wait for a notification before replying
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, model: &str, reply: Result<GenerateContentResponse, GeminiError>) {
        self.replies
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn reply_text(&self, model: &str, text: &str) {
        self.reply(model, Ok(GenerateContentResponse::from_text(text)));
    }

    /// Queue a speech reply carrying the given 16-bit samples
    pub fn reply_audio(&self, samples: &[i16]) {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.reply(
            SPEECH_MODEL,
            Ok(GenerateContentResponse::from_inline_data(
                "audio/L16;codec=pcm;rate=24000",
                STANDARD.encode(bytes),
            )),
        );
    }

    /// Hold every subsequent call until the returned handle is notified
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    /// Stop holding calls and let the one currently waiting through
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    /// Poll until at least `count` calls have reached the backend
    pub async fn wait_for_calls(&self, count: usize) {
        for _ in 0..200 {
            if self.calls.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("backend never received {} call(s)", count);
    }

    pub fn calls(&self) -> Vec<(String, GenerateContentRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<GenerateContentRequest> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == model)
            .map(|(_, request)| request)
            .collect()
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.replies
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Err(GeminiError::Api(500, format!("no reply scripted for {}", model))))
    }
}

/// Records buffers instead of playing them
#[derive(Default)]
pub struct FakeSink {
    played: Mutex<Vec<PcmBuffer>>,
    fail: Mutex<bool>,
}

impl FakeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        *sink.fail.lock().unwrap() = true;
        Arc::new(sink)
    }

    pub fn played(&self) -> Vec<PcmBuffer> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, buffer: PcmBuffer) -> Result<(), AudioError> {
        if *self.fail.lock().unwrap() {
            return Err(AudioError::NoDevice("test sink".to_string()));
        }
        self.played.lock().unwrap().push(buffer);
        Ok(())
    }
}

pub fn studio(backend: &Arc<FakeBackend>, sink: &Arc<FakeSink>) -> Studio {
    Studio::new(&test_config(), backend.clone(), sink.clone())
}

pub fn app_state(backend: &Arc<FakeBackend>, sink: &Arc<FakeSink>) -> AppState {
    AppState::new(studio(backend, sink), true)
}

pub fn warm_up_json(title: &str, listening_script: Option<&str>) -> String {
    let mut value = serde_json::json!({
        "title": title,
        "instruction": "Escucha el texto y contesta las preguntas.",
        "content": "1. ¿Cuántos hermanos tiene Ana?\n2. ¿Cómo se llama su madre?\n3. ¿Dónde vive su abuela?",
        "teacherKey": "1. Dos 2. Carmen 3. En Sevilla",
    });
    if let Some(script) = listening_script {
        value["listeningScript"] = serde_json::Value::String(script.to_string());
    }
    value.to_string()
}
