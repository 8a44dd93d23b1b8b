//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Runtime status
#[derive(Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub provider: &'static str,
    pub model: String,
    pub sessions: usize,
    pub speech_available: bool,
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        provider: state.relay.provider_name(),
        model: state.completion_options.model.clone(),
        sessions: state.sessions.len().await,
        speech_available: state.speech.is_some(),
    })
}

/// Build health router (liveness only, no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build status router
pub fn status_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .with_state(state)
}
