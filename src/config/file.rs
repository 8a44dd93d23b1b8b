//! TOML configuration file loading
//!
//! Supports `~/.config/chalkboard/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ChalkboardConfigFile {
    /// Completion service configuration
    #[serde(default)]
    pub completion: CompletionFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Session and upload limits
    #[serde(default)]
    pub limits: LimitsFileConfig,

    /// Directory for account and learning-record files
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompletionFileConfig {
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,
    /// Chat model (e.g. "gpt-4o")
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub history_window: Option<usize>,
    pub max_context_tokens: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// TTS model (e.g. "tts-1")
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub rate_limit_rpm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitsFileConfig {
    pub max_upload_bytes: Option<usize>,
    pub session_idle_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ChalkboardConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ChalkboardConfigFile {
    config_file_path()
        .map(|path| load_config_from(&path))
        .unwrap_or_default()
}

/// Load a config file from an explicit path
pub fn load_config_from(path: &Path) -> ChalkboardConfigFile {
    if !path.exists() {
        return ChalkboardConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ChalkboardConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ChalkboardConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chalkboard/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chalkboard").join("config.toml"))
}
