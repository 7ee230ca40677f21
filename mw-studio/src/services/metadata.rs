//! Lesson metadata extraction
//!
//! Sends an uploaded document to the generative model and asks for the unit
//! title, vocabulary and learning targets as JSON.

use std::sync::Arc;

use mw_common::LessonMetadata;
use serde_json::Value;
use tracing::{debug, warn};

use super::strip_code_fence;
use crate::gemini::{
    GeminiError, GenerateContentRequest, GenerationConfig, GenerativeBackend, Part, Schema,
};

pub const METADATA_INSTRUCTION: &str = "Analyze this Spanish lesson plan or vocabulary document. \
Extract the Unit Title, a list of key Vocabulary words, and the primary Learning Targets or \
Objectives. Return the result strictly as JSON.";

pub struct MetadataExtractor {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
}

impl MetadataExtractor {
    pub fn new(backend: Arc<dyn GenerativeBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn build_request(base64: &str, mime_type: &str) -> GenerateContentRequest {
        GenerateContentRequest::user(vec![
            Part::inline_data(mime_type, base64),
            Part::text(METADATA_INSTRUCTION),
        ])
        .with_config(GenerationConfig::json(Schema::string_object(
            &["unit", "vocabulary", "learningTargets"],
            &[],
        )))
    }

    /// Extract metadata from a document.
    ///
    /// Transport failures are returned; an unparseable reply is not an error
    /// and yields empty metadata.
    pub async fn extract(
        &self,
        base64: &str,
        mime_type: &str,
    ) -> Result<LessonMetadata, GeminiError> {
        debug!(model = %self.model, mime_type = %mime_type, bytes = base64.len(), "Extracting lesson metadata");

        let request = Self::build_request(base64, mime_type);
        let response = self.backend.generate_content(&self.model, &request).await?;

        Ok(response
            .text()
            .map(|text| parse_metadata(&text))
            .unwrap_or_default())
    }
}

/// Parse the model's JSON reply.
///
/// Anything that is not a JSON object yields empty metadata. List values are
/// joined with ", " since the form fields are free text.
pub fn parse_metadata(text: &str) -> LessonMetadata {
    let value: Value = match serde_json::from_str(strip_code_fence(text)) {
        Ok(value) => value,
        Err(e) => {
            warn!("Metadata reply was not valid JSON, ignoring: {}", e);
            return LessonMetadata::default();
        }
    };

    let Some(object) = value.as_object() else {
        warn!("Metadata reply was not a JSON object, ignoring");
        return LessonMetadata::default();
    };

    LessonMetadata {
        unit: object.get("unit").and_then(value_to_text),
        vocabulary: object.get("vocabulary").and_then(value_to_text),
        learning_targets: object.get("learningTargets").and_then(value_to_text),
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_reply() {
        let metadata = parse_metadata(
            r#"{"unit":"Unidad 4: La Comida","vocabulary":"la manzana, el pan","learningTargets":"Order food politely"}"#,
        );
        assert_eq!(metadata.unit.as_deref(), Some("Unidad 4: La Comida"));
        assert_eq!(metadata.vocabulary.as_deref(), Some("la manzana, el pan"));
        assert_eq!(metadata.learning_targets.as_deref(), Some("Order food politely"));
    }

    #[test]
    fn test_unparseable_reply_is_empty() {
        assert_eq!(parse_metadata("Sorry, I cannot help"), LessonMetadata::default());
        assert_eq!(parse_metadata(""), LessonMetadata::default());
        assert_eq!(parse_metadata("[1, 2]"), LessonMetadata::default());
    }

    #[test]
    fn test_partial_reply() {
        let metadata = parse_metadata(r#"{"unit":"Los Deportes"}"#);
        assert_eq!(metadata.unit.as_deref(), Some("Los Deportes"));
        assert!(metadata.vocabulary.is_none());
        assert!(metadata.learning_targets.is_none());
    }

    #[test]
    fn test_vocabulary_list_is_joined() {
        let metadata = parse_metadata(
            "```json\n{\"vocabulary\": [\"el fútbol\", \"el béisbol\"], \"unit\": null}\n```",
        );
        assert_eq!(metadata.vocabulary.as_deref(), Some("el fútbol, el béisbol"));
        assert!(metadata.unit.is_none());
    }

    #[test]
    fn test_request_carries_document_and_instruction() {
        let request = MetadataExtractor::build_request("QUJD", "application/pdf");
        assert_eq!(request.inline_data()[0].data, "QUJD");
        assert_eq!(request.inline_data()[0].mime_type, "application/pdf");
        assert_eq!(request.texts(), vec![METADATA_INSTRUCTION]);

        let config = request.generation_config.unwrap();
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        let properties = config.response_schema.unwrap().properties.unwrap();
        assert!(properties.contains_key("learningTargets"));
    }
}
