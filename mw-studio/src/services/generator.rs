//! Warm-up generation
//!
//! Builds the classroom warm-up prompt from the lesson form and parses the
//! model's structured JSON reply into a [`WarmUpResult`].

use std::collections::BTreeMap;
use std::sync::Arc;

use mw_common::{ActivityType, WarmUpRequest, WarmUpResult};
use thiserror::Error;
use tracing::debug;

use super::strip_code_fence;
use crate::gemini::{
    GeminiError, GenerateContentRequest, GenerationConfig, GenerativeBackend, Part, Schema,
    SchemaType,
};

pub const ATTACHMENT_REFERENCE: &str =
    "Reference this document for any specific formatting or examples requested in the warm-up.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Backend(#[from] GeminiError),

    #[error("Could not parse generated warm-up: {0}")]
    Parse(String),

    #[error("Listening activity was generated without a listening script")]
    MissingListeningScript,
}

pub struct WarmUpGenerator {
    backend: Arc<dyn GenerativeBackend>,
    model: String,
    require_listening_script: bool,
}

impl WarmUpGenerator {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        model: impl Into<String>,
        require_listening_script: bool,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            require_listening_script,
        }
    }

    pub async fn generate(&self, request: &WarmUpRequest) -> Result<WarmUpResult, GenerationError> {
        debug!(
            model = %self.model,
            class = %request.class_type,
            activity = %request.activity_type,
            attachment = request.attachment.is_some(),
            "Generating warm-up"
        );

        let body = build_request(request);
        let response = self.backend.generate_content(&self.model, &body).await?;
        let text = response.text().ok_or(GeminiError::EmptyResponse)?;
        let result = parse_result(&text)?;

        if self.require_listening_script
            && request.activity_type == ActivityType::Listening
            && result.listening_script().is_none()
        {
            return Err(GenerationError::MissingListeningScript);
        }

        Ok(result)
    }
}

/// Prompt text for a request
pub fn build_prompt(request: &WarmUpRequest) -> String {
    let class = request.class_type.profile();
    let activity = request.activity_type;

    let guidance: String = ActivityType::ALL
        .iter()
        .map(|a| format!("- If \"{}\": {}\n", a, a.guidance()))
        .collect();

    format!(
        "Create a 5-10 minute classroom warm-up exercise for a Spanish class.\n\
         Class Name: {name} ({level})\n\
         Unit: {unit}\n\
         Activity Type: {activity}\n\
         \n\
         CONTEXT:\n\
         Vocabulary provided: {vocabulary}\n\
         Learning Targets: {targets}\n\
         Lesson Plan Context: {plan}\n\
         \n\
         Based on the activity type \"{activity}\", generate:\n\
         {guidance}\
         \n\
         Make it engaging and appropriate for {level} level students.\n\
         The response must be strictly JSON.",
        name = class.name,
        level = class.level,
        unit = request.unit.trim(),
        activity = activity,
        vocabulary = request.vocabulary,
        targets = request.learning_targets,
        plan = request.lesson_plan,
        guidance = guidance,
    )
}

/// Full `generateContent` body: prompt, optional document, response schema
pub fn build_request(request: &WarmUpRequest) -> GenerateContentRequest {
    let mut parts = vec![Part::text(build_prompt(request))];

    if let Some(attachment) = &request.attachment {
        parts.push(Part::inline_data(&attachment.mime_type, &attachment.base64));
        parts.push(Part::text(ATTACHMENT_REFERENCE));
    }

    GenerateContentRequest::user(parts).with_config(GenerationConfig::json(result_schema()))
}

fn result_schema() -> Schema {
    let described = |description: &str| Schema {
        description: Some(description.to_string()),
        ..Schema::string()
    };

    let mut properties = BTreeMap::new();
    properties.insert("title".to_string(), Schema::string());
    properties.insert("instruction".to_string(), Schema::string());
    properties.insert(
        "content".to_string(),
        described("The actual exercise content for students"),
    );
    properties.insert(
        "teacherKey".to_string(),
        described("Answer key or teacher notes"),
    );
    properties.insert(
        "listeningScript".to_string(),
        described("Required if activity type is listening"),
    );

    Schema {
        schema_type: SchemaType::Object,
        description: None,
        properties: Some(properties),
        required: Some(vec![
            "title".to_string(),
            "instruction".to_string(),
            "content".to_string(),
        ]),
    }
}

pub fn parse_result(text: &str) -> Result<WarmUpResult, GenerationError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| GenerationError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_common::{ClassType, FileAttachment};

    fn request(activity_type: ActivityType) -> WarmUpRequest {
        WarmUpRequest {
            class_type: ClassType::Viaje,
            unit: "La Familia".to_string(),
            activity_type,
            vocabulary: "la madre, el padre, los hermanos".to_string(),
            learning_targets: "Describe family members".to_string(),
            lesson_plan: "Review possessive adjectives".to_string(),
            attachment: None,
        }
    }

    #[test]
    fn test_prompt_contains_every_guidance_phrase() {
        for activity in ActivityType::ALL {
            let prompt = build_prompt(&request(activity));
            for guidance in ActivityType::ALL.map(|a| a.guidance()) {
                assert!(prompt.contains(guidance), "{} prompt lacks {:?}", activity, guidance);
            }
            assert!(prompt.contains(&format!("Activity Type: {}", activity)));
        }
    }

    #[test]
    fn test_prompt_embeds_lesson_fields() {
        let prompt = build_prompt(&request(ActivityType::Spoken));
        assert!(prompt.contains("Class Name: Viaje (Intermediate)"));
        assert!(prompt.contains("Unit: La Familia"));
        assert!(prompt.contains("Vocabulary provided: la madre, el padre, los hermanos"));
        assert!(prompt.contains("Learning Targets: Describe family members"));
        assert!(prompt.contains("Lesson Plan Context: Review possessive adjectives"));
        assert!(prompt.contains("appropriate for Intermediate level students"));
    }

    #[test]
    fn test_attachment_appended_after_prompt() {
        let mut req = request(ActivityType::Written);
        req.attachment = Some(FileAttachment {
            name: "unidad.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            base64: "JVBERi0=".to_string(),
        });

        let body = build_request(&req);
        let parts = &body.contents[0].parts;
        assert_eq!(parts.len(), 3);
        assert!(parts[0].text.as_deref().unwrap().starts_with("Create a 5-10 minute"));
        assert_eq!(parts[1].inline_data.as_ref().unwrap().data, "JVBERi0=");
        assert_eq!(parts[2].text.as_deref(), Some(ATTACHMENT_REFERENCE));
    }

    #[test]
    fn test_schema_requires_core_fields() {
        let body = build_request(&request(ActivityType::Other));
        assert_eq!(body.contents[0].parts.len(), 1);

        let schema = body.generation_config.unwrap().response_schema.unwrap();
        assert_eq!(
            schema.required.unwrap(),
            vec!["title", "instruction", "content"]
        );
        assert_eq!(schema.properties.unwrap().len(), 5);
    }

    #[test]
    fn test_parse_result() {
        let result = parse_result(
            r#"{"title":"Mi Familia","instruction":"Escucha","content":"1. ¿Quién es?","listeningScript":"Hola, me llamo Ana."}"#,
        )
        .unwrap();
        assert_eq!(result.title, "Mi Familia");
        assert_eq!(result.listening_script(), Some("Hola, me llamo Ana."));
        assert!(result.teacher_key.is_none());
    }

    #[test]
    fn test_parse_result_missing_required_field() {
        let result = parse_result(r#"{"title":"Solo título"}"#);
        assert!(matches!(result, Err(GenerationError::Parse(_))));
    }
}
