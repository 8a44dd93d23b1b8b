//! Optional bearer-key check for `/api/*`

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{ApiError, ApiState};
use crate::Error;

/// Key from `Authorization: Bearer ...`, or `X-Api-Key` for simple clients
fn extract_api_key(req: &Request) -> Option<&str> {
    let headers = req.headers();
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
        .map(str::trim)
}

/// Reject requests without the configured key; open when none is configured
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected_key) = &state.api_key else {
        return Ok(next.run(req).await);
    };

    match extract_api_key(&req) {
        Some(key) if key == expected_key => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "invalid API key provided");
            Err(Error::Auth("invalid API key".to_string()).into())
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "no API key provided");
            Err(Error::Auth(
                "API key required (Authorization: Bearer or X-Api-Key)".to_string(),
            )
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_extract_api_key() {
        let mut req = Request::builder().body(Body::empty()).unwrap();

        // No header
        assert_eq!(extract_api_key(&req), None);

        req.headers_mut()
            .insert("x-api-key", HeaderValue::from_static("fallback"));
        assert_eq!(extract_api_key(&req), Some("fallback"));

        // Bearer wins
        req.headers_mut().insert(
            "authorization",
            HeaderValue::from_static("Bearer test-key-123"),
        );
        assert_eq!(extract_api_key(&req), Some("test-key-123"));
    }
}
