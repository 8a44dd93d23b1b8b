//! Lesson-plan generator

use serde::{Deserialize, Serialize};

use crate::completion::CompletionOptions;
use crate::conversation::ConversationRelay;
use crate::prompt::{LESSON_MINUTES, LESSON_PLANNER};
use crate::{Error, Result};

/// Digital-textbook features a plan may ask for
pub const MAX_FEATURES: usize = 3;

/// Lesson-plan request form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonPlanForm {
    pub subject: String,
    pub unit: String,
    pub topic: String,
    /// AI digital-textbook features to build into the lesson
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub must_include: String,
}

/// Generated plan
#[derive(Debug, Clone, Serialize)]
pub struct LessonPlan {
    pub plan: String,
    pub prompt: String,
}

impl LessonPlanForm {
    /// # Errors
    ///
    /// Returns `InputValidation` if subject, unit or topic is blank, or more
    /// than [`MAX_FEATURES`] features are listed
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("subject", &self.subject),
            ("unit", &self.unit),
            ("topic", &self.topic),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid(format!("{field} is required")));
            }
        }
        if self.features.len() > MAX_FEATURES {
            return Err(Error::invalid(format!(
                "at most {MAX_FEATURES} digital-textbook features can be listed"
            )));
        }
        Ok(())
    }

    /// User prompt listing every field
    #[must_use]
    pub fn prompt(&self) -> String {
        let features = self
            .features
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "수업시간은 {LESSON_MINUTES}분이야. 과목: {}\n단원명: {}\n수업주제: {}\n포함하고 싶은 AI 디지털 교과서 기능: {features}\n수업 상세 설명: {}\n꼭 넣고 싶은 것들: {}",
            self.subject.trim(),
            self.unit.trim(),
            self.topic.trim(),
            self.details.trim(),
            self.must_include.trim(),
        )
    }
}

/// Validate the form and ask for a plan
///
/// # Errors
///
/// Returns `InputValidation` for an incomplete form, `Upstream` if the
/// completion fails
pub async fn generate(
    relay: &ConversationRelay,
    form: &LessonPlanForm,
    options: &CompletionOptions,
) -> Result<LessonPlan> {
    form.validate()?;
    let prompt = form.prompt();
    let plan = relay.ask(LESSON_PLANNER, &prompt, options).await?;
    tracing::info!(subject = %form.subject, topic = %form.topic, "lesson plan generated");
    Ok(LessonPlan { plan, prompt })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> LessonPlanForm {
        LessonPlanForm {
            subject: "수학".to_string(),
            unit: "자료의 정리".to_string(),
            topic: "도수분포표".to_string(),
            features: vec!["대시보드".to_string(), " ".to_string(), "오답노트".to_string()],
            details: "모둠 활동".to_string(),
            must_include: String::new(),
        }
    }

    #[test]
    fn prompt_lists_every_field() {
        let prompt = form().prompt();
        assert!(prompt.starts_with("수업시간은 45분이야."));
        assert!(prompt.contains("과목: 수학\n"));
        assert!(prompt.contains("단원명: 자료의 정리\n"));
        assert!(prompt.contains("수업주제: 도수분포표\n"));
        assert!(prompt.contains("포함하고 싶은 AI 디지털 교과서 기능: 대시보드, 오답노트\n"));
        assert!(prompt.contains("수업 상세 설명: 모둠 활동\n"));
        assert!(prompt.ends_with("꼭 넣고 싶은 것들: "));
    }

    #[test]
    fn required_fields() {
        assert!(form().validate().is_ok());

        let missing = LessonPlanForm {
            topic: "  ".to_string(),
            ..form()
        };
        assert!(matches!(missing.validate(), Err(Error::InputValidation(m)) if m.contains("topic")));

        let too_many = LessonPlanForm {
            features: vec!["a".to_string(); 4],
            ..form()
        };
        assert!(too_many.validate().is_err());
    }

    #[test]
    fn optional_fields_default() {
        let form: LessonPlanForm =
            serde_json::from_str(r#"{"subject": "과학", "unit": "힘", "topic": "마찰력"}"#).unwrap();
        assert!(form.validate().is_ok());
        assert!(form.features.is_empty());
    }
}
