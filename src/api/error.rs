//! JSON error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

/// Handler error rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status and machine-readable code for the wrapped error
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            Error::InputValidation(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            Error::FileFormat(_) => (StatusCode::BAD_REQUEST, "file_format"),
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::SessionBusy(_) => (StatusCode::CONFLICT, "session_busy"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            e if e.is_upstream() => (StatusCode::BAD_GATEWAY, "upstream_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn from_error(err: &ApiError) -> Self {
        let (_, code) = err.status();
        Self {
            error: ErrorBody {
                code,
                message: err.0.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "request failed");
        } else {
            tracing::debug!(code, error = %self.0, "request rejected");
        }
        (status, Json(ErrorResponse::from_error(&self))).into_response()
    }
}
