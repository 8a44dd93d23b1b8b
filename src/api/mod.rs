//! HTTP API server for chalkboard

pub mod accounts;
mod auth;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod sessions;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::completion::CompletionOptions;
use crate::conversation::ConversationRelay;
use crate::session::SessionStore;
use crate::speech::SpeechSynthesizer;
use crate::store::{AccountStore, LearningRecordStore};
use crate::{Config, Result};

pub use error::ApiError;

/// Shared state for API handlers
pub struct ApiState {
    pub relay: Arc<ConversationRelay>,
    pub sessions: SessionStore,
    /// Present only when an `OpenAI` key is configured
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    /// Defaults for session turns and tool calls
    pub completion_options: CompletionOptions,
    pub max_upload_bytes: usize,
    pub session_idle: Duration,
    pub api_key: Option<String>,
    pub rate_limiter: Option<rate_limit::RequestThrottle>,
    pub accounts: AccountStore,
    pub records: LearningRecordStore,
}

impl ApiState {
    /// State wired from configuration; account files live under `data_dir`
    #[must_use]
    pub fn new(
        config: &Config,
        relay: Arc<ConversationRelay>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            relay,
            sessions: SessionStore::new(),
            speech,
            completion_options: config.completion_options(),
            max_upload_bytes: config.max_upload_bytes,
            session_idle: config.session_idle,
            api_key: config.api_server.api_key.clone(),
            rate_limiter: config.api_server.rate_limit_rpm.map(rate_limit::RequestThrottle::per_minute),
            accounts: AccountStore::new(config.data_dir.join("accounts.json")),
            records: LearningRecordStore::new(config.data_dir.join("learning_records.json")),
        }
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .merge(sessions::router(state.clone()))
        .merge(tools::router(state.clone()))
        .merge(accounts::router(state.clone()))
        .merge(health::status_router(state.clone()))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let router = Router::new().merge(api).merge(health::router());

    let router = router.layer(middleware::from_fn_with_state(
        state,
        rate_limit::throttle,
    ));

    // CORS layer for cross-origin requests from the tool pages
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if self.state.api_key.is_none() {
            tracing::warn!("API key not configured - allowing unauthenticated access");
        }
        if self.state.speech.is_none() {
            tracing::warn!("text-to-speech unavailable, listening tests cannot be rendered");
        }

        let pruner = spawn_session_pruner(self.state.sessions.clone(), self.state.session_idle);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        let served = axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")));

        pruner.abort();
        served
    }
}

/// Run file I/O or PDF parsing on the blocking pool, off the async workers
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| crate::Error::Io(std::io::Error::other(e)))?
}

/// Drop idle sessions in the background
fn spawn_session_pruner(sessions: SessionStore, max_idle: Duration) -> tokio::task::JoinHandle<()> {
    let period = (max_idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sessions.prune_idle(max_idle).await;
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_work_leaves_the_async_thread() {
        let caller = std::thread::current().id();
        let worker = run_blocking(|| Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(worker, caller);

        let err = run_blocking(|| Err::<(), _>(crate::Error::invalid("bad")))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::InputValidation(_)));
    }
}
