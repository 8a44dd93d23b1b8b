//! Conversation relay: replay a transcript to a completion provider

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;

use super::{Message, Transcript};
use crate::completion::{CompletionOptions, CompletionProvider, CompletionRequest};
use crate::knowledge::KnowledgeBase;
use crate::{Error, Result};

/// Instruction placed before knowledge-base text in the system message
pub const KNOWLEDGE_PREAMBLE: &str = "다음 문서 내용을 바탕으로 질문에 답해주세요:";

/// Sends transcripts to a completion provider and appends the replies
///
/// The relay holds no conversation state; every call takes the transcript
/// it works on and returns a new one.
#[derive(Clone)]
pub struct ConversationRelay {
    provider: Arc<dyn CompletionProvider>,
}

impl ConversationRelay {
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Name of the backing provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Assemble the outgoing request for `transcript`
    ///
    /// The knowledge base, when present, is folded into the system message
    /// here and never stored in the transcript.
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for invalid options or when there is nothing to send
    pub fn build_request(
        &self,
        transcript: &Transcript,
        knowledge: Option<&KnowledgeBase>,
        options: &CompletionOptions,
    ) -> Result<CompletionRequest> {
        options.validate()?;

        let system = system_text(transcript, knowledge);
        let turns = options
            .history()
            .select(transcript, system.as_deref().unwrap_or_default());

        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(system) = system {
            messages.push(Message::system(system));
        }
        messages.extend_from_slice(turns);

        if messages.is_empty() {
            return Err(Error::invalid("transcript is empty; nothing to send"));
        }

        Ok(CompletionRequest {
            model: options.model.clone(),
            messages,
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
        })
    }

    /// Send `transcript` and append the assistant reply
    ///
    /// Honors `options.streaming` by consuming the stream internally.
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the provider fails; `transcript` is left as it was
    pub async fn complete(
        &self,
        transcript: &Transcript,
        knowledge: Option<&KnowledgeBase>,
        options: &CompletionOptions,
    ) -> Result<(String, Transcript)> {
        if options.streaming {
            return self
                .complete_streaming(transcript, knowledge, options, |_| {})
                .await;
        }

        let request = self.build_request(transcript, knowledge, options)?;
        let started = Instant::now();

        let reply = self.provider.complete(&request).await.inspect_err(|e| {
            tracing::warn!(provider = self.provider.name(), error = %e, "completion failed");
        })?;

        tracing::info!(
            provider = self.provider.name(),
            model = %request.model,
            sent = request.messages.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "completion finished"
        );

        commit(transcript, reply)
    }

    /// Stream the reply, forwarding each fragment to `on_fragment` as it arrives
    ///
    /// The assistant message is appended once, after the stream ends cleanly.
    /// A stream that fails part-way commits nothing.
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the provider fails before or during the stream
    pub async fn complete_streaming<F>(
        &self,
        transcript: &Transcript,
        knowledge: Option<&KnowledgeBase>,
        options: &CompletionOptions,
        mut on_fragment: F,
    ) -> Result<(String, Transcript)>
    where
        F: FnMut(&str) + Send,
    {
        let request = self.build_request(transcript, knowledge, options)?;
        let started = Instant::now();

        let mut stream = self.provider.stream(&request).await.inspect_err(|e| {
            tracing::warn!(provider = self.provider.name(), error = %e, "stream failed to start");
        })?;

        let mut reply = String::new();
        let mut fragments = 0_usize;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment.inspect_err(|e| {
                tracing::warn!(
                    provider = self.provider.name(),
                    fragments,
                    error = %e,
                    "stream failed, discarding partial reply"
                );
            })?;
            if fragment.is_empty() {
                continue;
            }
            on_fragment(&fragment);
            reply.push_str(&fragment);
            fragments += 1;
        }

        tracing::info!(
            provider = self.provider.name(),
            model = %request.model,
            sent = request.messages.len(),
            fragments,
            elapsed_ms = started.elapsed().as_millis(),
            "streamed completion finished"
        );

        commit(transcript, reply)
    }

    /// Append a user turn and complete: the result is two messages longer
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for blank input, `Upstream` if the provider fails
    pub async fn send(
        &self,
        transcript: &Transcript,
        user_text: &str,
        knowledge: Option<&KnowledgeBase>,
        options: &CompletionOptions,
    ) -> Result<(String, Transcript)> {
        let with_user = transcript.with(user_turn(user_text)?)?;
        self.complete(&with_user, knowledge, options).await
    }

    /// One-shot prompt with a fixed system role, for form-style tools
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the provider fails
    pub async fn ask(
        &self,
        system: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let transcript = Transcript::seeded(system).with(user_turn(prompt)?)?;
        let (reply, _) = self.complete(&transcript, None, options).await?;
        Ok(reply)
    }
}

/// Validate and wrap user input
///
/// # Errors
///
/// Returns `InputValidation` if the text is blank
pub fn user_turn(text: &str) -> Result<Message> {
    if text.trim().is_empty() {
        return Err(Error::invalid("message must not be empty"));
    }
    Ok(Message::user(text))
}

fn system_text(transcript: &Transcript, knowledge: Option<&KnowledgeBase>) -> Option<String> {
    let base = transcript.system().map(|m| m.content.as_str());
    let grounding = knowledge
        .filter(|k| !k.is_empty())
        .map(|k| format!("{KNOWLEDGE_PREAMBLE}\n{}", k.text()));

    match (base, grounding) {
        (Some(base), Some(grounding)) => Some(format!("{base}\n\n{grounding}")),
        (Some(base), None) => Some(base.to_string()),
        (None, grounding) => grounding,
    }
}

fn commit(transcript: &Transcript, reply: String) -> Result<(String, Transcript)> {
    if reply.trim().is_empty() {
        return Err(Error::Upstream(
            "completion service returned an empty reply".to_string(),
        ));
    }
    let next = transcript.with(Message::assistant(reply.clone()))?;
    Ok((reply, next))
}
