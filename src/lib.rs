//! Chalkboard - conversation relay and classroom tools over an LLM API
//!
//! This library provides the core functionality for the Chalkboard server:
//! - A conversation relay that keeps per-session transcripts and forwards
//!   them to a completion service, whole or streamed
//! - PDF knowledge bases that ground document Q&A sessions
//! - Form-style teacher tools (lesson plans, award texts, chart statistics,
//!   listening-test audio)
//! - Flat-file account and learning-record storage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Interfaces                        │
//! │        HTTP API (axum)   │   CLI (chat, tools)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Chalkboard                         │
//! │  Sessions │ Relay │ Knowledge │ Tools │ Store       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        OpenAI-compatible services                   │
//! │        Chat completions  │  Speech                  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod knowledge;
pub mod prompt;
pub mod session;
pub mod speech;
pub mod store;
pub mod tools;

pub use completion::{CompletionOptions, CompletionProvider, CompletionRequest, OpenAiProvider};
pub use config::Config;
pub use conversation::{ConversationRelay, Message, Role, Transcript};
pub use error::{Error, Result};
pub use knowledge::{KnowledgeBase, extract_pdf_text};
pub use session::{Preset, Session, SessionStore};
pub use speech::{OpenAiSpeech, SpeechSynthesizer, Voice};
pub use store::{AccountStore, LearningRecordStore};
