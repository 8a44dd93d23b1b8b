//! Error types for Chalkboard

use thiserror::Error;

/// Result type alias for Chalkboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Chalkboard
#[derive(Debug, Error)]
pub enum Error {
    /// Completion or speech service failed (network, auth, rate limit, bad payload)
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Caller supplied a missing or out-of-range value
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Uploaded file is unreadable or in an unsupported format
    #[error("file format error: {0}")]
    FileFormat(String),

    /// Upload exceeds the configured size limit
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Session already has a request in flight
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// Resource already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authentication error
    #[error("auth error: {0}")]
    Auth(String),

    /// Caller exceeded the request rate
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Text-to-speech error
    #[error("speech error: {0}")]
    Speech(String),

    /// Audio decode/encode error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for an input validation failure
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InputValidation(message.into())
    }

    /// Whether the error was caused by the remote service rather than the caller
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Http(_) | Self::Speech(_))
    }
}
