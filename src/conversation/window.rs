//! History windowing for outgoing completion requests

use super::{Message, Transcript};

/// Approximate token count (4 chars ≈ 1 token)
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Limits applied to the turns sent with a completion request
///
/// The leading system message is always sent and counts against `max_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    /// Keep only the most recent N non-system messages
    pub max_messages: Option<usize>,
    /// Approximate token budget for system + turns
    pub max_tokens: Option<usize>,
}

impl HistoryWindow {
    /// No limits: send the whole transcript
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_messages: None,
            max_tokens: None,
        }
    }

    /// Select the turns of `transcript` that fit this window, oldest first
    ///
    /// The system message is not included in the result.
    #[must_use]
    pub fn select<'a>(&self, transcript: &'a Transcript, system_text: &str) -> &'a [Message] {
        let turns = transcript.turns();

        let start = self
            .max_messages
            .map_or(0, |n| turns.len().saturating_sub(n));
        let windowed = &turns[start..];

        let Some(budget) = self.max_tokens else {
            return windowed;
        };

        // Walk newest to oldest, keeping whatever fits
        let mut used = estimate_tokens(system_text);
        let mut keep = 0;
        for message in windowed.iter().rev() {
            let cost = estimate_tokens(&message.content);
            if used + cost > budget {
                break;
            }
            used += cost;
            keep += 1;
        }

        // Always send at least the newest turn
        if keep == 0 && !windowed.is_empty() {
            keep = 1;
        }

        let dropped = windowed.len() - keep;
        if dropped > 0 {
            tracing::debug!(dropped, budget, "pruned history to fit token budget");
        }

        &windowed[dropped..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(n: usize) -> Transcript {
        let mut transcript = Transcript::seeded("system");
        for i in 0..n {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            transcript = transcript.append(role, format!("m{i}")).unwrap();
        }
        transcript
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("가나다라"), 1);
    }

    #[test]
    fn unbounded_keeps_all_turns() {
        let transcript = chat(5);
        let selected = HistoryWindow::unbounded().select(&transcript, "system");
        assert_eq!(selected.len(), 5);
        assert_eq!(selected[0].content, "m0");
    }

    #[test]
    fn message_window_keeps_most_recent() {
        let transcript = chat(6);
        let window = HistoryWindow {
            max_messages: Some(2),
            max_tokens: None,
        };
        let selected = window.select(&transcript, "system");
        let contents: Vec<&str> = selected.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m4", "m5"]);
    }

    #[test]
    fn token_budget_drops_oldest() {
        let mut transcript = Transcript::new();
        for text in ["a".repeat(40), "b".repeat(40), "c".repeat(40)] {
            transcript = transcript.append("user", text).unwrap();
        }
        // 10 tokens each; budget fits two
        let window = HistoryWindow {
            max_messages: None,
            max_tokens: Some(25),
        };
        let selected = window.select(&transcript, "");
        assert_eq!(selected.len(), 2);
        assert!(selected[0].content.starts_with('b'));
    }

    #[test]
    fn token_budget_keeps_newest_even_if_too_large() {
        let transcript = Transcript::new().append("user", "x".repeat(400)).unwrap();
        let window = HistoryWindow {
            max_messages: None,
            max_tokens: Some(5),
        };
        assert_eq!(window.select(&transcript, "").len(), 1);
    }
}
