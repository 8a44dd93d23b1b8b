//! Session endpoints: create, inspect, converse, upload knowledge

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::error::{ApiError, ErrorResponse};
use super::{ApiState, run_blocking};
use crate::completion::CompletionOptions;
use crate::knowledge::{KnowledgeBase, KnowledgeSummary};
use crate::session::{Preset, SessionSnapshot};

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    // One byte over still reaches the handler, which answers with a JSON 413
    let upload_limit = state.max_upload_bytes.saturating_add(1);

    Router::new()
        .route("/api/sessions", post(create_session).get(list_sessions))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/{id}/reset", post(reset_session))
        .route("/api/sessions/{id}/messages", post(send_message))
        .route("/api/sessions/{id}/messages/stream", post(stream_message))
        .route(
            "/api/sessions/{id}/knowledge",
            put(upload_knowledge).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
}

// --- Request/Response types ---

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub preset: Preset,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
    pub preset: Preset,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSnapshot>,
    pub total: usize,
}

/// A user turn, with optional per-request overrides
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl MessageRequest {
    fn options(&self, defaults: &CompletionOptions) -> CompletionOptions {
        let mut options = defaults.clone();
        if let Some(model) = &self.model {
            options.model.clone_from(model);
        }
        if let Some(temperature) = self.temperature {
            options.temperature = temperature;
        }
        options
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    /// Non-system messages in the transcript after this turn
    pub message_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Original file name, shown back in the knowledge summary
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub knowledge: KnowledgeSummary,
    /// Whether an earlier knowledge base was replaced
    pub replaced: bool,
}

// --- Handlers ---

async fn create_session(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateSessionRequest>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let preset = request.preset;
    let id = state.sessions.create(preset).await;
    tracing::info!(session = %id, preset = %preset, "session started");
    (StatusCode::CREATED, Json(CreateSessionResponse { id, preset }))
}

async fn list_sessions(State(state): State<Arc<ApiState>>) -> Json<SessionListResponse> {
    let sessions = state.sessions.list().await;
    let total = sessions.len();
    Json(SessionListResponse { sessions, total })
}

async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state.sessions.acquire(id).await?;
    Ok(Json(session.snapshot()))
}

async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.remove(id).await?;
    tracing::info!(session = %id, "session ended");
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let mut session = state.sessions.acquire(id).await?;
    session.reset();
    Ok(Json(session.snapshot()))
}

async fn send_message(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let options = request.options(&state.completion_options);
    let mut session = state.sessions.acquire(id).await?;

    let reply = session
        .submit(&state.relay, &request.text, &options)
        .await?;

    Ok(Json(MessageResponse {
        reply,
        message_count: session.transcript().turns().len(),
    }))
}

/// Stream the reply as server-sent events
///
/// Fragments arrive as unnamed events. The stream ends with a `done` event
/// carrying the full reply, or an `error` event with the usual error body.
async fn stream_message(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let options = request.options(&state.completion_options).streaming(true);
    // Lock before answering so a busy session is a plain 409
    let mut session = state.sessions.acquire(id).await?;

    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    tokio::spawn(async move {
        let fragments = tx.clone();
        let result = session
            .submit_streaming(&state.relay, &request.text, &options, |fragment| {
                // The client may have gone away; the turn is still recorded
                let _ = fragments.send(Event::default().data(fragment));
            })
            .await;

        let last = match result {
            Ok(reply) => Event::default()
                .event("done")
                .json_data(serde_json::json!({ "reply": reply })),
            Err(e) => {
                let err = ApiError(e);
                tracing::warn!(session = %id, error = %err.0, "streamed turn failed");
                Event::default()
                    .event("error")
                    .json_data(ErrorResponse::from_error(&err))
            }
        };
        match last {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => tracing::error!(error = %e, "failed to encode final event"),
        }
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn upload_knowledge(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    // Fail fast on unknown ids before parsing the PDF
    state.sessions.get(id).await?;

    let source = query.name.unwrap_or_else(|| "upload.pdf".to_string());
    let max_bytes = state.max_upload_bytes;
    let knowledge =
        run_blocking(move || KnowledgeBase::from_pdf(source, &body, max_bytes)).await?;
    let summary = knowledge.summary();

    let mut session = state.sessions.acquire(id).await?;
    let replaced = session.set_knowledge(knowledge).is_some();
    tracing::info!(session = %id, pages = summary.pages, replaced, "knowledge base uploaded");

    Ok(Json(UploadResponse {
        knowledge: summary,
        replaced,
    }))
}
