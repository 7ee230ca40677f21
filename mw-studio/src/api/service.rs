//! Service-level routes: embedded UI assets, health and build identification

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::AppState;

const MODULE_NAME: &str = "mw-studio";

const INDEX_HTML: &str = include_str!("../ui/index.html");
const APP_JS: &str = include_str!("../ui/app.js");

pub fn service_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/static/app.js", get(app_js))
        .route("/health", get(health))
        .route("/api/buildinfo", get(build_info))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
}

/// Compile-time identification plus whether AI calls can be made
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub build_profile: &'static str,
    pub api_key_configured: bool,
}

impl BuildInfo {
    pub fn current(api_key_configured: bool) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("GIT_HASH"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
            build_profile: env!("BUILD_PROFILE"),
            api_key_configured,
        }
    }
}

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /static/app.js
pub async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        APP_JS,
    )
}

/// GET /health
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        module: MODULE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/buildinfo
pub async fn build_info(State(state): State<AppState>) -> Json<BuildInfo> {
    Json(BuildInfo::current(state.api_key_configured))
}
