//! AI-backed lesson services

pub mod attachment;
pub mod generator;
pub mod metadata;
pub mod speech;

pub use generator::{GenerationError, WarmUpGenerator};
pub use metadata::MetadataExtractor;
pub use speech::{SpeechError, SpeechSynthesizer};

/// Strip a surrounding Markdown code fence (```json ... ```) if present
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.strip_suffix("```").unwrap_or(body).trim()
}
