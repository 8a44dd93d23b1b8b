//! `OpenAI` chat completions provider

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionProvider, CompletionRequest, SseDecoder, TextStream};
use crate::conversation::Message;
use crate::{Error, Result};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completions over HTTP (`OpenAI` or any compatible server)
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a provider against `base_url`
    ///
    /// `timeout` bounds non-streaming calls end to end. For streaming calls it
    /// bounds the connect phase and every wait for the next chunk.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty or the HTTP client cannot be built
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for completions".to_string(),
            ));
        }

        let client = Client::builder().connect_timeout(timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = ChatCompletionRequest::from_request(request, stream);

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if !stream {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(upstream)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "OpenAI API error {status}: {}",
                api_error_message(&body)
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion"
        );

        let response = self.send(request, false).await?;
        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("failed to parse OpenAI response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Upstream("OpenAI response contained no message".to_string()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "starting streamed chat completion"
        );

        let response = self.send(request, true).await?;
        Ok(fragments(response.bytes_stream(), self.timeout))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn upstream(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Upstream(format!("OpenAI request timed out: {e}"))
    } else {
        Error::Upstream(format!("OpenAI request failed: {e}"))
    }
}

/// Pull the human-readable message out of an API error body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// One decoded stream event
#[derive(Debug, PartialEq, Eq)]
enum StreamEvent {
    Fragment(String),
    Skip,
    Done,
}

fn parse_stream_event(payload: &str) -> Result<StreamEvent> {
    if payload.trim() == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| Error::Upstream(format!("malformed stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::Upstream(format!("OpenAI stream error: {}", error.message)));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty())
        .map_or(StreamEvent::Skip, StreamEvent::Fragment))
}

struct FragmentState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> FragmentState<S> {
    fn absorb(&mut self, payload: &str) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        match parse_stream_event(payload)? {
            StreamEvent::Fragment(text) => self.pending.push_back(text),
            StreamEvent::Skip => {}
            StreamEvent::Done => self.finished = true,
        }
        Ok(())
    }
}

/// Turn an SSE byte stream into reply fragments, ending at `[DONE]`
///
/// A body that closes before `[DONE]`, or stays silent for `idle_timeout`,
/// yields `Upstream` so a truncated reply is never committed.
fn fragments<S, B>(body: S, idle_timeout: Duration) -> TextStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = FragmentState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.finished {
                return None;
            }

            let Ok(next) = tokio::time::timeout(idle_timeout, state.body.next()).await else {
                state.finished = true;
                state.pending.clear();
                return Some((
                    Err(Error::Upstream(format!(
                        "OpenAI stream timed out after {}s without data",
                        idle_timeout.as_secs_f32()
                    ))),
                    state,
                ));
            };

            match next {
                Some(Ok(bytes)) => {
                    for payload in state.decoder.push(bytes.as_ref()) {
                        if let Err(e) = state.absorb(&payload) {
                            state.finished = true;
                            state.pending.clear();
                            return Some((Err(e), state));
                        }
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.clear();
                    return Some((Err(upstream(e)), state));
                }
                None => {
                    if let Some(payload) = state.decoder.finish()
                        && let Err(e) = state.absorb(&payload)
                    {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                    if !state.finished {
                        state.finished = true;
                        state.pending.clear();
                        return Some((
                            Err(Error::Upstream(
                                "OpenAI stream ended before [DONE]".to_string(),
                            )),
                            state,
                        ));
                    }
                }
            }
        }
    });

    Box::pin(stream)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_request(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            stream,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    async fn collect(parts: Vec<String>) -> Vec<Result<String>> {
        let body = futures::stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, reqwest::Error>(p.into_bytes())),
        );
        fragments(body, Duration::from_secs(5)).collect().await
    }

    #[test]
    fn test_new_requires_key() {
        let result = OpenAiProvider::new(String::new(), None, Duration::from_secs(5));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let provider = OpenAiProvider::new(
            "sk-test".to_string(),
            Some("http://localhost:8080/v1/".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::system("s"), Message::user("u")],
            temperature: 0.7,
            max_output_tokens: None,
        };
        let json = serde_json::to_value(ChatCompletionRequest::from_request(&request, true)).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["stream"], true);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_stream_event() {
        assert_eq!(parse_stream_event("[DONE]").unwrap(), StreamEvent::Done);
        assert_eq!(
            parse_stream_event(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap(),
            StreamEvent::Fragment("hi".to_string())
        );
        assert_eq!(
            parse_stream_event(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            StreamEvent::Skip
        );
        assert_eq!(
            parse_stream_event(r#"{"choices":[{"delta":{"content":""}}]}"#).unwrap(),
            StreamEvent::Skip
        );
        assert!(parse_stream_event("not json").is_err());
        assert!(parse_stream_event(r#"{"error":{"message":"rate limited"}}"#).is_err());
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(api_error_message("plain text"), "plain text");
    }

    #[tokio::test]
    async fn test_fragments_concatenate() {
        let items = collect(vec![
            chunk("Hel"),
            chunk("lo"),
            "data: [DONE]\n\n".to_string(),
            chunk("ignored after done"),
        ])
        .await;
        let texts: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts, ["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_fragments_split_across_chunks() {
        let whole = format!("{}{}data: [DONE]\n\n", chunk("a"), chunk("b"));
        let (left, right) = whole.split_at(10);
        let items = collect(vec![left.to_string(), right.to_string()]).await;
        let texts: Vec<String> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(texts.concat(), "ab");
    }

    #[tokio::test]
    async fn test_fragments_without_done_fail() {
        let items = collect(vec![chunk("cut"), chunk(" off")]).await;
        assert_eq!(items.len(), 3);
        assert!(items[..2].iter().all(Result::is_ok));
        assert!(matches!(items[2], Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_fragments_time_out_when_body_stalls() {
        let body = futures::stream::iter(vec![Ok::<_, reqwest::Error>(chunk("hi").into_bytes())])
            .chain(futures::stream::pending());
        let items: Vec<Result<String>> = tokio::time::timeout(
            Duration::from_secs(5),
            fragments(body, Duration::from_millis(50)).collect(),
        )
        .await
        .expect("stalled body must end the stream");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "hi");
        match &items[1] {
            Err(Error::Upstream(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fragments_stop_on_error() {
        let items = collect(vec![chunk("ok"), "data: {broken\n\n".to_string(), chunk("late")]).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::Upstream(_))));
    }
}
