//! Session API
//!
//! All mutating endpoints return the updated session snapshot.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use mw_common::{ActivityType, ClassProfile, ClassType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::session::{FormUpdate, SessionSnapshot};
use crate::AppState;

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build session routes; `max_upload_bytes` bounds attachment uploads
pub fn session_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/classes", get(list_classes))
        .route("/api/session", get(get_session))
        .route("/api/session/class", post(select_class))
        .route("/api/session/continue", post(continue_to_details))
        .route("/api/session/back", post(back))
        .route("/api/session/modify", post(modify))
        .route("/api/session/reset", post(reset))
        .route("/api/session/form", put(update_form))
        .route(
            "/api/session/attachment",
            post(upload_attachment)
                .delete(remove_attachment)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/api/session/generate", post(generate))
        .route("/api/session/speak", post(speak))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOption {
    pub id: ActivityType,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassesResponse {
    pub classes: Vec<ClassProfile>,
    pub activity_types: Vec<ActivityOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectClassBody {
    pub class_type: ClassType,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// GET /api/classes
pub async fn list_classes() -> Json<ClassesResponse> {
    Json(ClassesResponse {
        classes: ClassType::profiles(),
        activity_types: ActivityType::ALL
            .iter()
            .map(|&id| ActivityOption {
                id,
                label: id.label(),
            })
            .collect(),
    })
}

/// GET /api/session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.studio.snapshot())
}

/// POST /api/session/class
pub async fn select_class(
    State(state): State<AppState>,
    payload: Result<Json<SelectClassBody>, JsonRejection>,
) -> ApiResult<Json<SessionSnapshot>> {
    let body = json_body(payload)?;
    Ok(Json(state.studio.select_class(body.class_type)?))
}

/// POST /api/session/continue
pub async fn continue_to_details(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.studio.continue_to_details()?))
}

/// POST /api/session/back
pub async fn back(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.studio.back()?))
}

/// POST /api/session/modify
pub async fn modify(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.studio.modify()?))
}

/// POST /api/session/reset
pub async fn reset(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.studio.reset())
}

/// PUT /api/session/form
pub async fn update_form(
    State(state): State<AppState>,
    payload: Result<Json<FormUpdate>, JsonRejection>,
) -> ApiResult<Json<SessionSnapshot>> {
    let update = json_body(payload)?;
    Ok(Json(state.studio.update_form(update)?))
}

/// POST /api/session/attachment
///
/// Multipart upload with a single `file` field. Responds once document
/// analysis has finished (successfully or not); analysis is not abandoned
/// if the client disconnects first.
pub async fn upload_attachment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SessionSnapshot>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or("document")
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        debug!(name = %name, bytes = bytes.len(), "Received attachment upload");

        if bytes.len() > state.studio.max_upload_bytes() {
            return Err(ApiError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                state.studio.max_upload_bytes()
            )));
        }

        let snapshot = state
            .studio
            .detached(move |studio| async move {
                studio.attach(&name, content_type.as_deref(), &bytes).await
            })
            .await?;
        return Ok(Json(snapshot));
    }

    Err(ApiError::BadRequest("Missing 'file' field".to_string()))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// DELETE /api/session/attachment
pub async fn remove_attachment(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.studio.remove_attachment()?))
}

/// POST /api/session/generate
///
/// Generates from EditDetails, regenerates from ViewResult. The call keeps
/// running if the client disconnects; the result lands in the session.
pub async fn generate(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    let snapshot = state
        .studio
        .detached(|studio| async move { studio.generate().await })
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/session/speak
pub async fn speak(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    let snapshot = state
        .studio
        .detached(|studio| async move { studio.speak().await })
        .await?;
    Ok(Json(snapshot))
}
