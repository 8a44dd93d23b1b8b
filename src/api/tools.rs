//! Page tool endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::error::ApiError;
use crate::completion::CompletionOptions;
use crate::tools::{
    AWARD_MODEL, AwardEntry, AwardRecommendation, ChartRequest, ChartSummary, LessonPlan,
    LessonPlanForm, ListeningOptions, ListeningPlan, awards, chart, lesson_plan, listening,
};
use crate::Error;

/// Build tools router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/tools/lesson-plan", post(create_lesson_plan))
        .route("/api/tools/awards", post(recommend_awards))
        .route("/api/tools/chart/summary", post(chart_summary))
        .route("/api/tools/chart/suggestions", post(chart_suggestions))
        .route("/api/tools/chart/hints", post(chart_hints))
        .route("/api/tools/listening/plan", post(listening_plan))
        .route("/api/tools/listening/render", post(listening_render))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct AwardsRequest {
    pub entries: Vec<AwardEntry>,
    /// Defaults to [`AWARD_MODEL`]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AwardsResponse {
    pub results: Vec<AwardRecommendation>,
    /// Entries whose recommendation failed
    pub failed: usize,
}

/// Completion-backed advice text
#[derive(Debug, Serialize)]
pub struct AdviceResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ListeningRequest {
    pub script: String,
    #[serde(default)]
    pub options: ListeningOptions,
}

async fn create_lesson_plan(
    State(state): State<Arc<ApiState>>,
    Json(form): Json<LessonPlanForm>,
) -> Result<Json<LessonPlan>, ApiError> {
    let plan = lesson_plan::generate(&state.relay, &form, &state.completion_options).await?;
    Ok(Json(plan))
}

async fn recommend_awards(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AwardsRequest>,
) -> Result<Json<AwardsResponse>, ApiError> {
    let options = CompletionOptions {
        temperature: state.completion_options.temperature,
        ..CompletionOptions::for_model(request.model.as_deref().unwrap_or(AWARD_MODEL))
    };
    let results = awards::recommend(&state.relay, &request.entries, &options).await?;
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    Ok(Json(AwardsResponse { results, failed }))
}

async fn chart_summary(Json(request): Json<ChartRequest>) -> Result<Json<ChartSummary>, ApiError> {
    Ok(Json(chart::summarize(&request)?))
}

async fn chart_suggestions(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChartRequest>,
) -> Result<Json<AdviceResponse>, ApiError> {
    let text = chart::suggest(&state.relay, &request, &state.completion_options).await?;
    Ok(Json(AdviceResponse { text }))
}

async fn chart_hints(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ChartRequest>,
) -> Result<Json<AdviceResponse>, ApiError> {
    let text = chart::hints(&state.relay, &request, &state.completion_options).await?;
    Ok(Json(AdviceResponse { text }))
}

async fn listening_plan(Json(request): Json<ListeningRequest>) -> Result<Json<ListeningPlan>, ApiError> {
    Ok(Json(ListeningPlan::new(&request.script, &request.options)?))
}

/// Render the whole test to one WAV file
async fn listening_render(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ListeningRequest>,
) -> Result<Response, ApiError> {
    let synth = state
        .speech
        .as_ref()
        .ok_or_else(|| Error::Config("text-to-speech is not configured".to_string()))?;

    let plan = ListeningPlan::new(&request.script, &request.options)?;
    let audio = listening::render(&plan, &**synth).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"listening.wav\""),
        ],
        audio.wav,
    )
        .into_response())
}
