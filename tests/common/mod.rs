//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use chalkboard::api::{self, ApiState};
use chalkboard::completion::{CompletionProvider, CompletionRequest, TextStream};
use chalkboard::config::file::ChalkboardConfigFile;
use chalkboard::speech::{AudioClip, SpeechSynthesizer, Voice};
use chalkboard::{Config, ConversationRelay, Error, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use tokio::sync::Notify;

/// Completion provider that answers from a queue of scripted replies
///
/// `None` entries fail with `Upstream`. Once the queue is empty every call
/// echoes the last user message as `"echo: ..."`. Streamed replies are split
/// on spaces.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Gate>,
}

/// Holds a call open until released, so a test can observe a busy session
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            ..Self::default()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Gate::default()),
            ..Self::default()
        }
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("provider is not gated")
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn next_reply(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(Error::Upstream("scripted failure".to_string())),
            None => {
                let last = request
                    .messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Ok(format!("echo: {last}"))
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.next_reply(request).await
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        let reply = self.next_reply(request).await?;
        let mut fragments: Vec<Result<String>> = Vec::new();
        for (i, word) in reply.split(' ').enumerate() {
            let fragment = if i == 0 { word.to_string() } else { format!(" {word}") };
            fragments.push(Ok(fragment));
        }
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Speech synthesizer returning one quiet sample per character at 24 kHz
pub struct ToneSpeech;

#[async_trait]
impl SpeechSynthesizer for ToneSpeech {
    async fn synthesize(&self, text: &str, _voice: Voice, _speed: f32) -> Result<AudioClip> {
        Ok(AudioClip::new(vec![0.25; text.chars().count()], 24_000))
    }

    fn name(&self) -> &'static str {
        "tone"
    }
}

/// Test server around a scripted provider, with its data directory
pub struct TestApp {
    pub router: axum::Router,
    pub provider: Arc<ScriptedProvider>,
    pub state: Arc<ApiState>,
    _data_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self::with_env(provider, &[])
    }

    /// Build with extra `CHALKBOARD_*` settings
    pub fn with_env(provider: ScriptedProvider, env: &[(&str, &str)]) -> Self {
        let data_dir = tempfile::tempdir().expect("temp dir");
        let data_path = data_dir.path().to_string_lossy().into_owned();

        let mut vars: Vec<(String, String)> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        vars.push(("CHALKBOARD_DATA_DIR".to_string(), data_path));
        let config = Config::resolve(ChalkboardConfigFile::default(), move |key| {
            vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .expect("valid test config");

        let provider = Arc::new(provider);
        let relay = Arc::new(ConversationRelay::new(provider.clone()));
        let speech: Arc<dyn SpeechSynthesizer> = Arc::new(ToneSpeech);
        let state = Arc::new(ApiState::new(&config, relay, Some(speech)));

        Self {
            router: api::router(state.clone()),
            provider,
            state,
            _data_dir: data_dir,
        }
    }
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Build a PDF with one page of text per entry
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).unwrap();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
