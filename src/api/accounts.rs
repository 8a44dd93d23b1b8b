//! Account and learning-record endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::{ApiState, run_blocking};
use crate::store::LearningRecord;

/// Build accounts router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/accounts", post(register))
        .route("/api/accounts/login", post(login))
        .route("/api/records/{email}", get(list_records).post(append_record))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordRequest {
    pub activity: String,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub email: String,
    pub records: Vec<LearningRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RecordAppendResponse {
    pub record: LearningRecord,
    pub total: usize,
}

async fn register(
    State(state): State<Arc<ApiState>>,
    Json(credentials): Json<Credentials>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let email = run_blocking(move || {
        state
            .accounts
            .register(&credentials.email, &credentials.password)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(AccountResponse { email })))
}

async fn login(
    State(state): State<Arc<ApiState>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<AccountResponse>, ApiError> {
    let email = run_blocking(move || {
        state
            .accounts
            .verify(&credentials.email, &credentials.password)
    })
    .await?;
    tracing::info!(email = %email, "login succeeded");
    Ok(Json(AccountResponse { email }))
}

async fn list_records(
    State(state): State<Arc<ApiState>>,
    Path(email): Path<String>,
) -> Result<Json<RecordListResponse>, ApiError> {
    let records = {
        let email = email.clone();
        run_blocking(move || state.records.list(&email)).await?
    };
    Ok(Json(RecordListResponse {
        email: email.trim().to_lowercase(),
        total: records.len(),
        records,
    }))
}

async fn append_record(
    State(state): State<Arc<ApiState>>,
    Path(email): Path<String>,
    Json(request): Json<RecordRequest>,
) -> Result<(StatusCode, Json<RecordAppendResponse>), ApiError> {
    let record = LearningRecord::now(request.activity, request.detail);
    let total = {
        let record = record.clone();
        run_blocking(move || state.records.append(&email, record)).await?
    };
    Ok((StatusCode::CREATED, Json(RecordAppendResponse { record, total })))
}
