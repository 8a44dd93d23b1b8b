//! Text-to-speech boundary
//!
//! The listening-test builder only sees [`SpeechSynthesizer`]; the
//! production implementation calls the `OpenAI` speech endpoint and decodes
//! the returned MP3 into PCM.

mod audio;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use audio::{AudioClip, decode_mp3, samples_to_wav};

use crate::{Error, Result};

/// Slowest speaking rate accepted by the speech endpoint for these tools
pub const MIN_SPEED: f32 = 0.55;
/// Fastest speaking rate
pub const MAX_SPEED: f32 = 1.85;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Built-in speech voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Echo,
    Fable,
    Nova,
    Onyx,
    Shimmer,
}

impl Voice {
    /// Every voice, in the order clients list them
    pub const ALL: [Self; 6] = [
        Self::Alloy,
        Self::Echo,
        Self::Fable,
        Self::Nova,
        Self::Onyx,
        Self::Shimmer,
    ];

    /// Voices offered for female speakers
    pub const FEMALE: [Self; 4] = [Self::Alloy, Self::Fable, Self::Nova, Self::Shimmer];

    /// Voices offered for male speakers
    pub const MALE: [Self; 2] = [Self::Echo, Self::Onyx];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Nova => "nova",
            Self::Onyx => "onyx",
            Self::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid(format!("unknown voice: {s}")))
    }
}

/// Validate a speaking rate
///
/// # Errors
///
/// Returns `InputValidation` outside [`MIN_SPEED`, `MAX_SPEED`]
pub fn check_speed(speed: f32) -> Result<f32> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(Error::invalid(format!(
            "speed must be between {MIN_SPEED} and {MAX_SPEED}, got {speed}"
        )))
    }
}

/// Turns text into decoded audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` with `voice` at `speed`
    async fn synthesize(&self, text: &str, voice: Voice, speed: f32) -> Result<AudioClip>;

    fn name(&self) -> &'static str;
}

/// `OpenAI` speech endpoint client
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiSpeech {
    /// Create a speech client
    ///
    /// # Errors
    ///
    /// Returns `Config` if the API key is missing or the HTTP client cannot be built
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for speech".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        })
    }

    /// Raw MP3 bytes for `text`
    ///
    /// # Errors
    ///
    /// Returns `Speech` on a failed request or non-2xx response
    pub async fn synthesize_mp3(&self, text: &str, voice: Voice, speed: f32) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: Voice,
            speed: f32,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            speed: check_speed(speed)?,
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Speech(format!("speech request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Speech(format!("OpenAI speech error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Speech(format!("failed to read speech audio: {e}")))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Voice, speed: f32) -> Result<AudioClip> {
        let mp3 = self.synthesize_mp3(text, voice, speed).await?;
        let clip = decode_mp3(&mp3)?;
        tracing::debug!(
            voice = %voice,
            chars = text.chars().count(),
            duration_ms = clip.duration_ms(),
            "synthesized speech"
        );
        Ok(clip)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_parsing() {
        assert_eq!("fable".parse::<Voice>().unwrap(), Voice::Fable);
        assert_eq!(" Nova ".parse::<Voice>().unwrap(), Voice::Nova);
        assert!("bob".parse::<Voice>().is_err());
        assert_eq!(serde_json::to_string(&Voice::Onyx).unwrap(), "\"onyx\"");
    }

    #[test]
    fn speed_bounds() {
        assert!(check_speed(1.0).is_ok());
        assert!(check_speed(MIN_SPEED).is_ok());
        assert!(check_speed(MAX_SPEED).is_ok());
        assert!(check_speed(0.5).is_err());
        assert!(check_speed(2.0).is_err());
    }

    #[test]
    fn requires_api_key() {
        let err = OpenAiSpeech::new("", "tts-1", None, Duration::from_secs(5)).err();
        assert!(matches!(err, Some(Error::Config(_))));
    }
}
