//! Gemini REST client
//!
//! `POST {base_url}/models/{model}:generateContent`, authenticated with the
//! `x-goog-api-key` header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mw_common::config::TomlConfig;
use thiserror::Error;

use super::types::{GenerateContentRequest, GenerateContentResponse};

const USER_AGENT: &str = concat!("mw-studio/", env!("CARGO_PKG_VERSION"));

/// Gemini client errors
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Response contained no usable content")]
    EmptyResponse,
}

/// Generative AI transport
///
/// The studio only ever needs one-shot content generation; implementations
/// return the raw response and callers interpret it.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError>;
}

/// HTTP implementation of [`GenerativeBackend`]
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GeminiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &TomlConfig, api_key: Option<String>) -> Result<Self, GeminiError> {
        Self::new(
            config.api_base_url.clone(),
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GeminiError::Config("Gemini API key not configured".to_string()))?;

        let url = self.endpoint(model);
        tracing::debug!(model = %model, url = %url, "Calling Gemini generateContent");
        let started = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api(status.as_u16(), error_text));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Parse(e.to_string()))?;

        tracing::info!(
            model = %model,
            candidates = body.candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gemini call completed"
        );

        Ok(body)
    }
}
