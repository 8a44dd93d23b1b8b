//! Configuration management for Chalkboard
//!
//! Values resolve env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::completion::{CompletionOptions, MAX_TEMPERATURE};
use crate::{Error, Result};

use self::file::ChalkboardConfigFile;

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default upload limit for knowledge-base PDFs (20 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Chalkboard configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion service settings
    pub completion: CompletionConfig,

    /// Text-to-speech settings
    pub speech: SpeechConfig,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Largest accepted PDF upload
    pub max_upload_bytes: usize,

    /// Sessions untouched for this long are dropped
    pub session_idle: Duration,

    /// Path to data directory (accounts, learning records)
    pub data_dir: PathBuf,
}

/// Completion service configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// `OpenAI` API key (from `OPENAI_API_KEY`)
    pub api_key: Option<String>,

    /// Base URL override for OpenAI-compatible services
    pub base_url: Option<String>,

    /// Chat model identifier
    pub model: String,

    pub temperature: f32,

    /// Per-request timeout for non-streaming calls
    pub timeout: Duration,

    /// Keep only the most recent N non-system messages
    pub history_window: Option<usize>,

    /// Approximate token budget for outgoing context
    pub max_context_tokens: Option<usize>,
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// TTS model (e.g. "tts-1")
    pub model: String,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Bearer key required on `/api/*` (from `CHALKBOARD_API_KEY`)
    pub api_key: Option<String>,

    /// Global requests-per-minute limit; unset disables limiting
    pub rate_limit_rpm: Option<u32>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns `Config` if a value is out of range
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge `env` over a parsed config file over defaults
    ///
    /// # Errors
    ///
    /// Returns `Config` if a value is out of range
    pub fn resolve<F>(fc: ChalkboardConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let completion = CompletionConfig {
            api_key: env("OPENAI_API_KEY")
                .or(fc.completion.api_key)
                .filter(|k| !k.trim().is_empty()),
            base_url: env("CHALKBOARD_BASE_URL").or(fc.completion.base_url),
            model: env("CHALKBOARD_MODEL")
                .or(fc.completion.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_env(&env, "CHALKBOARD_TEMPERATURE")
                .or(fc.completion.temperature)
                .unwrap_or(0.7),
            timeout: Duration::from_secs(
                parse_env(&env, "CHALKBOARD_TIMEOUT_SECS")
                    .or(fc.completion.timeout_secs)
                    .unwrap_or(120),
            ),
            history_window: parse_env(&env, "CHALKBOARD_HISTORY_WINDOW").or(fc.completion.history_window),
            max_context_tokens: parse_env(&env, "CHALKBOARD_MAX_CONTEXT_TOKENS")
                .or(fc.completion.max_context_tokens),
        };

        let speech = SpeechConfig {
            model: env("CHALKBOARD_TTS_MODEL")
                .or(fc.speech.model)
                .unwrap_or_else(|| "tts-1".to_string()),
        };

        let api_server = ApiServerConfig {
            port: parse_env(&env, "CHALKBOARD_PORT")
                .or_else(|| parse_env(&env, "PORT"))
                .or(fc.server.port)
                .unwrap_or(8080),
            api_key: env("CHALKBOARD_API_KEY")
                .or(fc.server.api_key)
                .filter(|k| !k.is_empty()),
            rate_limit_rpm: parse_env(&env, "CHALKBOARD_RATE_LIMIT_RPM").or(fc.server.rate_limit_rpm),
        };

        // ~/.local/share/chalkboard on Linux
        let data_dir = env("CHALKBOARD_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let config = Self {
            completion,
            speech,
            api_server,
            max_upload_bytes: parse_env(&env, "CHALKBOARD_MAX_UPLOAD_BYTES")
                .or(fc.limits.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            session_idle: Duration::from_secs(
                parse_env(&env, "CHALKBOARD_SESSION_IDLE_SECS")
                    .or(fc.limits.session_idle_secs)
                    .unwrap_or(60 * 60),
            ),
            data_dir,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_TEMPERATURE).contains(&self.completion.temperature) {
            return Err(Error::Config(format!(
                "temperature must be between 0 and {MAX_TEMPERATURE}"
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max upload size must be positive".to_string()));
        }
        if self.completion.timeout.is_zero() {
            return Err(Error::Config("completion timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// The `OpenAI` API key, required by every remote call
    ///
    /// # Errors
    ///
    /// Returns `Config` if no key is set
    pub fn openai_api_key(&self) -> Result<&str> {
        self.completion.api_key.as_deref().ok_or_else(|| {
            Error::Config(
                "OPENAI_API_KEY is not set (or add api_key under [completion] in config.toml)"
                    .to_string(),
            )
        })
    }

    /// Default completion options for chat sessions
    #[must_use]
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.completion.model.clone(),
            temperature: self.completion.temperature,
            history_window: self.completion.history_window,
            max_context_tokens: self.completion.max_context_tokens,
            ..CompletionOptions::default()
        }
    }
}

fn parse_env<T, F>(env: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = env(key)?;
    let value = raw.trim().parse().ok();
    if value.is_none() {
        tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
    }
    value
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("chalkboard"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::resolve(ChalkboardConfigFile::default(), env(&[])).unwrap();

        assert_eq!(config.completion.model, DEFAULT_MODEL);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.api_server.port, 8080);
        assert!(config.api_server.api_key.is_none());
        assert!(config.openai_api_key().is_err());
    }

    #[test]
    fn env_beats_file() {
        let mut fc = ChalkboardConfigFile::default();
        fc.completion.model = Some("gpt-4o-mini".to_string());
        fc.server.port = Some(9000);
        fc.completion.history_window = Some(6);

        let config = Config::resolve(
            fc,
            env(&[
                ("CHALKBOARD_MODEL", "gpt-4.1"),
                ("OPENAI_API_KEY", "sk-test"),
                ("CHALKBOARD_MAX_UPLOAD_BYTES", "1024"),
            ]),
        )
        .unwrap();

        assert_eq!(config.completion.model, "gpt-4.1");
        assert_eq!(config.api_server.port, 9000);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.openai_api_key().unwrap(), "sk-test");

        let options = config.completion_options();
        assert_eq!(options.model, "gpt-4.1");
        assert_eq!(options.history_window, Some(6));
        assert!(!options.streaming);
    }

    #[test]
    fn out_of_range_rejected() {
        let result = Config::resolve(
            ChalkboardConfigFile::default(),
            env(&[("CHALKBOARD_TEMPERATURE", "3.5")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
