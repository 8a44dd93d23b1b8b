//! Conversation transcripts and the relay that replays them to a completion service
//!
//! A [`Transcript`] is an append-only list of role-tagged messages. The
//! [`ConversationRelay`] sends a transcript (or a window of it) to a
//! [`CompletionProvider`](crate::completion::CompletionProvider) and returns
//! the reply together with the extended transcript.

mod relay;
mod window;

pub use relay::{ConversationRelay, KNOWLEDGE_PREAMBLE, user_turn};
pub use window::{HistoryWindow, estimate_tokens};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(Error::invalid(format!("unknown message role: {other:?}"))),
        }
    }
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered, append-only list of messages
///
/// Holds at most one system message, and only at position 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Create a transcript seeded with a system message
    #[must_use]
    pub fn seeded(system: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system)],
        }
    }

    /// Return a new transcript with `content` appended under the role named `role`
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` if the role is not one of system/user/assistant,
    /// or if a system message would land anywhere but position 0
    pub fn append(&self, role: &str, content: impl Into<String>) -> Result<Self> {
        let role = role.parse::<Role>()?;
        self.with(Message::new(role, content))
    }

    /// Return a new transcript with `message` appended
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` if a system message would land anywhere but position 0
    pub fn with(&self, message: Message) -> Result<Self> {
        let mut next = self.clone();
        next.push(message)?;
        Ok(next)
    }

    /// Append in place
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` if a system message would land anywhere but position 0
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.role == Role::System && !self.messages.is_empty() {
            return Err(Error::invalid(
                "system message is only allowed as the first message",
            ));
        }
        self.messages.push(message);
        Ok(())
    }

    /// All messages in conversation order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The leading system message, if any
    #[must_use]
    pub fn system(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    /// Messages after the system message
    #[must_use]
    pub fn turns(&self) -> &[Message] {
        let skip = usize::from(self.system().is_some());
        &self.messages[skip..]
    }

    /// The most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<'de> Deserialize<'de> for Transcript {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let messages = Vec::<Message>::deserialize(deserializer)?;
        let mut transcript = Self::new();
        for message in messages {
            transcript
                .push(message)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut transcript = Transcript::new();
        for i in 0..6 {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            transcript = transcript.append(role, format!("turn {i}")).unwrap();
        }

        assert_eq!(transcript.len(), 6);
        for (i, message) in transcript.messages().iter().enumerate() {
            assert_eq!(message.content, format!("turn {i}"));
        }
    }

    #[test]
    fn append_leaves_original_untouched() {
        let original = Transcript::seeded("be brief");
        let next = original.append("user", "hi").unwrap();

        assert_eq!(original.len(), 1);
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn append_rejects_unknown_role() {
        let err = Transcript::new().append("tool", "x").unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
    }

    #[test]
    fn system_message_only_at_start() {
        let transcript = Transcript::new().append("system", "rules").unwrap();
        assert!(transcript.system().is_some());

        let err = transcript.append("system", "more rules").unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));

        let err = Transcript::new()
            .append("user", "hi")
            .unwrap()
            .append("system", "late")
            .unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
    }

    #[test]
    fn turns_skip_system() {
        let transcript = Transcript::seeded("rules")
            .append("user", "q")
            .unwrap()
            .append("assistant", "a")
            .unwrap();

        assert_eq!(transcript.turns().len(), 2);
        assert_eq!(transcript.turns()[0].role, Role::User);
        assert_eq!(Transcript::new().turns().len(), 0);
    }

    #[test]
    fn role_round_trips_through_serde() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn deserialize_enforces_system_position() {
        let bad = r#"[{"role":"user","content":"a"},{"role":"system","content":"b"}]"#;
        assert!(serde_json::from_str::<Transcript>(bad).is_err());

        let good = r#"[{"role":"system","content":"a"},{"role":"user","content":"b"}]"#;
        let transcript: Transcript = serde_json::from_str(good).unwrap();
        assert_eq!(transcript.len(), 2);
    }
}
