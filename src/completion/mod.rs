//! Completion service boundary
//!
//! Providers take an ordered list of role-tagged messages plus sampling
//! parameters and return either the whole reply or a stream of text fragments
//! that concatenate to it.

mod openai;
mod sse;

pub use openai::OpenAiProvider;
pub use sse::SseDecoder;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::conversation::{HistoryWindow, Message};
use crate::{Error, Result};

/// Incremental reply fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Upper bound accepted for `temperature`
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Request sent to a completion provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

/// Per-call settings for the conversation relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionOptions {
    /// Model identifier (e.g. "gpt-4o")
    pub model: String,
    /// Sampling temperature in [0, 2]
    pub temperature: f32,
    /// Request a streamed reply
    pub streaming: bool,
    /// Cap on generated tokens
    pub max_output_tokens: Option<u32>,
    /// Keep only the most recent N non-system messages
    pub history_window: Option<usize>,
    /// Approximate token budget for the outgoing transcript
    pub max_context_tokens: Option<usize>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            streaming: false,
            max_output_tokens: None,
            history_window: None,
            max_context_tokens: None,
        }
    }
}

impl CompletionOptions {
    /// Options for `model` with defaults elsewhere
    #[must_use]
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Builder-style toggle for streaming
    #[must_use]
    pub const fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// History limits derived from these options
    #[must_use]
    pub const fn history(&self) -> HistoryWindow {
        HistoryWindow {
            max_messages: self.history_window,
            max_tokens: self.max_context_tokens,
        }
    }

    /// Check ranges before a request goes out
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for an empty model, a temperature outside
    /// [0, 2], or a zero token cap
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::invalid("model identifier must not be empty"));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(Error::invalid(format!(
                "temperature must be within [0, {MAX_TEMPERATURE}], got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == Some(0) {
            return Err(Error::invalid("max_output_tokens must be positive"));
        }
        Ok(())
    }
}

/// A remote text-generation capability
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the whole reply
    ///
    /// # Errors
    ///
    /// Returns `Upstream` when the remote call fails
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Return the reply as a stream of fragments
    ///
    /// # Errors
    ///
    /// Returns `Upstream` when the remote call cannot be started; errors
    /// mid-stream are yielded as stream items
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
