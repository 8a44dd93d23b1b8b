//! Award recommendation writer
//!
//! One completion per student. A failed entry carries its error text and
//! does not stop the rest of the batch.

use serde::{Deserialize, Serialize};

use crate::completion::CompletionOptions;
use crate::conversation::ConversationRelay;
use crate::prompt::AWARD_WRITER;
use crate::{Error, Result};

/// Model used for award recommendations unless the caller overrides it
pub const AWARD_MODEL: &str = "gpt-4o-mini";

/// Largest batch accepted in one request
pub const MAX_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardEntry {
    pub award_name: String,
    pub student_name: String,
    pub student_quality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwardRecommendation {
    pub student_name: String,
    pub award_name: String,
    /// Present when the completion succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    /// Present when the completion failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AwardEntry {
    #[must_use]
    pub fn prompt(&self) -> String {
        format!(
            "{AWARD_WRITER} {} 학생이 '{}' 상을 받아야 하는 이유를 생성해 주세요. 학생의 우수한 점은 다음과 같습니다: {}",
            self.student_name.trim(),
            self.award_name.trim(),
            self.student_quality.trim(),
        )
    }
}

/// # Errors
///
/// Returns `InputValidation` for an empty or oversized batch, or an entry with a blank field
pub fn validate(entries: &[AwardEntry]) -> Result<()> {
    if entries.is_empty() {
        return Err(Error::invalid("add at least one student"));
    }
    if entries.len() > MAX_ENTRIES {
        return Err(Error::invalid(format!("at most {MAX_ENTRIES} students per request")));
    }
    for (index, entry) in entries.iter().enumerate() {
        for (field, value) in [
            ("award_name", &entry.award_name),
            ("student_name", &entry.student_name),
            ("student_quality", &entry.student_quality),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid(format!(
                    "student {}: {field} is required",
                    index + 1
                )));
            }
        }
    }
    Ok(())
}

/// Write a recommendation for every entry, in order
///
/// # Errors
///
/// Returns `InputValidation` if the batch is invalid; completion failures are
/// reported per entry
pub async fn recommend(
    relay: &ConversationRelay,
    entries: &[AwardEntry],
    options: &CompletionOptions,
) -> Result<Vec<AwardRecommendation>> {
    validate(entries)?;

    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let outcome = relay.ask(AWARD_WRITER, &entry.prompt(), options).await;
        let (recommendation, error) = match outcome {
            Ok(text) => (Some(text.trim().to_string()), None),
            Err(e) => {
                tracing::warn!(student = %entry.student_name, error = %e, "award recommendation failed");
                (None, Some(format!("추천 이유를 생성하는 중 오류 발생: {e}")))
            }
        };
        results.push(AwardRecommendation {
            student_name: entry.student_name.clone(),
            award_name: entry.award_name.clone(),
            recommendation,
            error,
        });
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    tracing::info!(entries = results.len(), failed, "award recommendations written");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::completion::{CompletionProvider, CompletionRequest, TextStream};

    /// Fails for any prompt that mentions the given student
    struct FailsFor(&'static str);

    #[async_trait]
    impl CompletionProvider for FailsFor {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            let prompt = &request.messages[1].content;
            if prompt.contains(self.0) {
                Err(Error::Upstream("rate limited".to_string()))
            } else {
                Ok(format!("  추천: {}  ", request.model))
            }
        }

        async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
            let reply = self.complete(request).await?;
            Ok(Box::pin(futures::stream::iter(vec![Ok(reply)])))
        }

        fn name(&self) -> &'static str {
            "fails-for"
        }
    }

    fn entry(student: &str) -> AwardEntry {
        AwardEntry {
            award_name: "모범상".to_string(),
            student_name: student.to_string(),
            student_quality: "친구를 잘 돕는다".to_string(),
        }
    }

    #[test]
    fn prompt_format() {
        assert_eq!(
            entry("민수").prompt(),
            "당신은 도움이 되는 조수입니다. 민수 학생이 '모범상' 상을 받아야 하는 이유를 생성해 주세요. 학생의 우수한 점은 다음과 같습니다: 친구를 잘 돕는다"
        );
    }

    #[test]
    fn validation() {
        assert!(validate(&[]).is_err());
        assert!(validate(&[entry("a")]).is_ok());
        let blank = AwardEntry {
            student_quality: String::new(),
            ..entry("b")
        };
        let err = validate(&[entry("a"), blank]).unwrap_err();
        assert!(err.to_string().contains("student 2"));
    }

    #[tokio::test]
    async fn failure_is_per_entry() {
        let relay = ConversationRelay::new(Arc::new(FailsFor("지수")));
        let options = CompletionOptions::for_model(AWARD_MODEL);

        let results = recommend(&relay, &[entry("민수"), entry("지수"), entry("하준")], &options)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].recommendation.as_deref(), Some("추천: gpt-4o-mini"));
        assert!(results[1].recommendation.is_none());
        assert!(results[1].error.as_deref().unwrap().contains("rate limited"));
        assert!(results[2].error.is_none());
        assert_eq!(results[2].student_name, "하준");
    }
}
