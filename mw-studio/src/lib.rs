//! mw-studio library interface
//!
//! Local web service that walks a teacher through building a classroom
//! warm-up: pick a class, describe the lesson (optionally from an uploaded
//! document), generate the exercise, and play listening scripts aloud.

pub mod api;
pub mod audio;
pub mod error;
pub mod gemini;
pub mod services;
pub mod session;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};
pub use crate::workflow::Studio;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
    /// Whether a Gemini API key was resolved at startup
    pub api_key_configured: bool,
}

impl AppState {
    pub fn new(studio: Studio, api_key_configured: bool) -> Self {
        Self {
            studio: Arc::new(studio),
            api_key_configured,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.studio.max_upload_bytes();

    Router::new()
        .merge(api::service_routes())
        .merge(api::session_routes(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
