//! Per-session conversation state
//!
//! Each [`Session`] owns its transcript and optional knowledge base. The
//! [`SessionStore`] hands out sessions behind their own async mutex so that
//! separate sessions never contend, and a session handles one request at a
//! time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::completion::CompletionOptions;
use crate::conversation::{ConversationRelay, Message, Transcript, user_turn};
use crate::knowledge::{KnowledgeBase, KnowledgeSummary};
use crate::{Error, Result, prompt};

/// What a session's transcript is seeded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Lesson-design assistant
    DesignHelper,
    /// Step-by-step general helper
    #[default]
    General,
    /// Answers from an uploaded document
    Document,
}

impl Preset {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DesignHelper => "design-helper",
            Self::General => "general",
            Self::Document => "document",
        }
    }

    /// Fresh transcript for this preset
    #[must_use]
    pub fn seed(self) -> Transcript {
        match self {
            Self::DesignHelper => Transcript::seeded(prompt::DESIGN_HELPER),
            Self::General => Transcript::seeded(prompt::GENERAL_HELPER),
            Self::Document => Transcript::new(),
        }
    }

    /// Whether the preset refuses questions until a document is uploaded
    #[must_use]
    pub const fn requires_knowledge(self) -> bool {
        matches!(self, Self::Document)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "design-helper" => Ok(Self::DesignHelper),
            "general" => Ok(Self::General),
            "document" => Ok(Self::Document),
            other => Err(Error::invalid(format!("unknown preset: {other}"))),
        }
    }
}

/// One user's conversation context
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    preset: Preset,
    transcript: Transcript,
    knowledge: Option<KnowledgeBase>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub preset: Preset,
    /// Messages after the system prompt
    pub messages: Vec<Message>,
    pub knowledge: Option<KnowledgeSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(preset: Preset) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            preset,
            transcript: preset.seed(),
            knowledge: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn preset(&self) -> Preset {
        self.preset
    }

    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub const fn knowledge(&self) -> Option<&KnowledgeBase> {
        self.knowledge.as_ref()
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replace the knowledge base, returning the previous one
    pub fn set_knowledge(&mut self, knowledge: KnowledgeBase) -> Option<KnowledgeBase> {
        self.touch();
        self.knowledge.replace(knowledge)
    }

    /// Drop the conversation back to its seed; the knowledge base stays
    pub fn reset(&mut self) {
        self.transcript = self.preset.seed();
        self.touch();
    }

    /// Append the user's turn and ask the relay for a reply
    ///
    /// The user turn is kept if the completion fails upstream; the assistant
    /// turn is only recorded on success. Rejected input or options leave the
    /// transcript untouched.
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for blank input, invalid options or a
    /// document session with no knowledge base, `Upstream` when the
    /// completion fails
    pub async fn submit(
        &mut self,
        relay: &ConversationRelay,
        text: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        self.record_user_turn(text, options)?;
        let (reply, transcript) = relay
            .complete(&self.transcript, self.knowledge.as_ref(), options)
            .await?;
        self.transcript = transcript;
        self.touch();
        Ok(reply)
    }

    /// Streaming variant of [`Session::submit`]
    ///
    /// # Errors
    ///
    /// Same as [`Session::submit`]
    pub async fn submit_streaming<F>(
        &mut self,
        relay: &ConversationRelay,
        text: &str,
        options: &CompletionOptions,
        on_fragment: F,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        self.record_user_turn(text, options)?;
        let (reply, transcript) = relay
            .complete_streaming(&self.transcript, self.knowledge.as_ref(), options, on_fragment)
            .await?;
        self.transcript = transcript;
        self.touch();
        Ok(reply)
    }

    fn record_user_turn(&mut self, text: &str, options: &CompletionOptions) -> Result<()> {
        options.validate()?;
        if self.preset.requires_knowledge() && self.knowledge.is_none() {
            return Err(Error::invalid(
                "upload a PDF to build the knowledge base before asking questions",
            ));
        }
        self.transcript.push(user_turn(text)?)?;
        self.touch();
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            preset: self.preset,
            messages: self.transcript.turns().to_vec(),
            knowledge: self.knowledge.as_ref().map(KnowledgeBase::summary),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Session handle shared between requests
pub type SharedSession = Arc<Mutex<Session>>;

/// In-memory registry of live sessions
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session and return its id
    pub async fn create(&self, preset: Preset) -> Uuid {
        let session = Session::new(preset);
        let id = session.id();
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::debug!(session = %id, preset = %preset, "session created");
        id
    }

    /// Look up a session
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session has this id
    pub async fn get(&self, id: Uuid) -> Result<SharedSession> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Lock a session for one request, failing instead of waiting if it is busy
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, `SessionBusy` if another request holds it
    pub async fn acquire(&self, id: Uuid) -> Result<OwnedMutexGuard<Session>> {
        let session = self.get(id).await?;
        session
            .try_lock_owned()
            .map_err(|_| Error::SessionBusy(format!("session {id} is still answering")))
    }

    /// End a session
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session has this id
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| tracing::debug!(session = %id, "session ended"))
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Snapshots of every idle session (busy sessions are skipped)
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let mut snapshots: Vec<SessionSnapshot> = sessions
            .values()
            .filter_map(|s| s.try_lock().ok().map(|s| s.snapshot()))
            .collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop idle sessions not touched within `max_idle`; returns how many went
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            session
                .try_lock()
                .map_or(true, |s| s.updated_at() >= cutoff)
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::info!(pruned, remaining = sessions.len(), "pruned idle sessions");
        }
        pruned
    }
}
