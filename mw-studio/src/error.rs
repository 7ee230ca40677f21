//! HTTP error responses for mw-studio
//!
//! Every error is rendered as `{"error": {"code": ..., "message": ...}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::session::SessionError;
use crate::workflow::WorkflowError;

pub const MSG_GENERATION_FAILED: &str = "Failed to generate warm-up. Please try again.";
pub const MSG_SPEECH_FAILED: &str = "Speech generation failed.";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Busy or wrong step (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payload above the upload limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Warm-up generation failed upstream (502)
    #[error("Generation failed")]
    GenerationFailed,

    /// Speech synthesis or playback failed (502)
    #[error("Speech failed")]
    SpeechFailed,

    /// Operation task died (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Session(SessionError::Validation(msg)) => ApiError::BadRequest(msg),
            WorkflowError::Session(other) => ApiError::Conflict(other.to_string()),
            WorkflowError::Attachment(err @ mw_common::Error::TooLarge { .. }) => {
                ApiError::PayloadTooLarge(err.to_string())
            }
            WorkflowError::Attachment(mw_common::Error::InvalidInput(msg)) => {
                ApiError::BadRequest(msg)
            }
            WorkflowError::Attachment(other) => ApiError::BadRequest(other.to_string()),
            WorkflowError::Generation(_) => ApiError::GenerationFailed,
            WorkflowError::Speech(_) => ApiError::SpeechFailed,
            WorkflowError::Aborted(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::GenerationFailed => (
                StatusCode::BAD_GATEWAY,
                "GENERATION_FAILED",
                MSG_GENERATION_FAILED.to_string(),
            ),
            ApiError::SpeechFailed => (
                StatusCode::BAD_GATEWAY,
                "SPEECH_FAILED",
                MSG_SPEECH_FAILED.to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
