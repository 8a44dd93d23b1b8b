//! Listening-test script parsing
//!
//! Scripts are plain text as teachers type them:
//!
//! ```text
//! 1. 대화를 듣고, 여자가 부탁한 일로 가장 적절한 것을 고르시오.
//! W: Can you help me
//! carry these boxes?
//! M: Sure.
//! 2번 다음을 듣고 ...
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Question number at the start of a line: `1.`, `2번`, `12 .`
static QUESTION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\s*(?:\.|번)\s*(.*)$").expect("valid regex")
});

/// Speaker marker: `M:`, `W:`, `남:`, `여:` (ASCII or full-width colon)
static SPEAKER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(M|W|남|여)\s*[:：]\s*(.*)$").expect("valid regex")
});

/// Voice gender of an English speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

/// Who reads a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// Korean instructions
    Narrator,
    Female,
    Male,
}

impl From<Gender> for Speaker {
    fn from(gender: Gender) -> Self {
        match gender {
            Gender::Female => Self::Female,
            Gender::Male => Self::Male,
        }
    }
}

/// Dominant script of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Korean,
    English,
}

/// One spoken sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptLine {
    pub speaker: Speaker,
    pub text: String,
}

/// A numbered question and its lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    /// Number as written, `None` for lines before the first number
    pub number: Option<u32>,
    pub lines: Vec<ScriptLine>,
}

/// Whether `text` has anything to read aloud (a Latin or Hangul letter)
#[must_use]
pub fn has_speakable_text(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic() || is_hangul(c))
}

/// Korean when Hangul syllables outnumber Latin letters
#[must_use]
pub fn detect_language(text: &str) -> Language {
    let (korean, english) = text.chars().fold((0_usize, 0_usize), |(k, e), c| {
        if is_hangul(c) {
            (k + 1, e)
        } else if c.is_ascii_alphabetic() {
            (k, e + 1)
        } else {
            (k, e)
        }
    });
    if korean > english {
        Language::Korean
    } else {
        Language::English
    }
}

/// Split a script into questions of speaker-tagged sentences
///
/// Every question starts with the female voice; a speaker marker switches
/// gender until the next marker. Mostly-Hangul lines go to the narrator.
#[must_use]
pub fn parse_script(script: &str) -> Vec<Question> {
    let mut parser = Parser::default();
    for raw in script.lines() {
        let line = raw.trim();
        if !has_speakable_text(line) {
            continue;
        }

        let content = match QUESTION_NUMBER.captures(line) {
            Some(caps) => {
                let number = caps[1].parse().ok();
                parser.start_question(number);
                caps.get(2).map_or("", |m| m.as_str()).trim().to_string()
            }
            None => line.to_string(),
        };
        parser.feed(&content);
    }
    parser.finish()
}

#[derive(Default)]
struct Parser {
    questions: Vec<Question>,
    current: Option<Question>,
    gender: Option<Gender>,
    pending: Option<ScriptLine>,
}

impl Parser {
    fn start_question(&mut self, number: Option<u32>) {
        self.flush();
        if let Some(question) = self.current.take() {
            self.questions.push(question);
        }
        self.current = Some(Question {
            number,
            lines: Vec::new(),
        });
        self.gender = None;
    }

    fn feed(&mut self, content: &str) {
        let text = match SPEAKER_MARKER.captures(content) {
            Some(caps) => {
                self.flush();
                self.gender = Some(match &caps[1] {
                    "M" | "남" => Gender::Male,
                    _ => Gender::Female,
                });
                caps.get(2).map_or("", |m| m.as_str()).trim().to_string()
            }
            None => content.trim().to_string(),
        };
        if !has_speakable_text(&text) {
            return;
        }

        let speaker = match detect_language(&text) {
            Language::Korean => Speaker::Narrator,
            Language::English => self.gender.unwrap_or(Gender::Female).into(),
        };

        match &mut self.pending {
            Some(pending) if pending.speaker == speaker => {
                pending.text.push(' ');
                pending.text.push_str(&text);
            }
            _ => {
                self.flush();
                self.pending = Some(ScriptLine { speaker, text });
            }
        }

        if self.pending.as_ref().is_some_and(|p| ends_sentence(&p.text)) {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if let Some(line) = self.pending.take() {
            self.current
                .get_or_insert_with(|| Question {
                    number: None,
                    lines: Vec::new(),
                })
                .lines
                .push(line);
        }
    }

    fn finish(mut self) -> Vec<Question> {
        self.flush();
        if let Some(question) = self.current.take() {
            self.questions.push(question);
        }
        self.questions.retain(|q| !q.lines.is_empty());
        self.questions
    }
}

fn ends_sentence(text: &str) -> bool {
    text.ends_with(['.', '?', '!'])
}

const fn is_hangul(c: char) -> bool {
    matches!(c, '가'..='힣')
}
