//! Listening-test audio builder
//!
//! A script is parsed into questions, every line gets a voice, and the
//! synthesized lines are joined with silences into one WAV file.

mod script;

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub use script::{
    Gender, Language, Question, ScriptLine, Speaker, detect_language, has_speakable_text,
    parse_script,
};

use crate::speech::{AudioClip, SpeechSynthesizer, Voice, check_speed, samples_to_wav};
use crate::{Error, Result};

/// Pause between lines, in milliseconds
pub const LINE_GAP_MS: std::ops::RangeInclusive<u32> = 30..=1000;
/// Pause between questions, in seconds
pub const QUESTION_GAP_SECS: std::ops::RangeInclusive<u32> = 1..=15;

/// How a speaker's voice is picked for each question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VoiceChoice {
    /// Same voice throughout
    Fixed(Voice),
    /// Rotate through the gender's voices by question index
    Sequential,
    /// Random voice of the gender per question
    Random,
}

impl VoiceChoice {
    fn pick<R: Rng + ?Sized>(self, gender: Gender, question: usize, rng: &mut R) -> Voice {
        let pool: &[Voice] = match gender {
            Gender::Female => &Voice::FEMALE,
            Gender::Male => &Voice::MALE,
        };
        match self {
            Self::Fixed(voice) => voice,
            Self::Sequential => pool[question % pool.len()],
            Self::Random => pool.choose(rng).copied().unwrap_or(pool[0]),
        }
    }
}

impl fmt::Display for VoiceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(voice) => write!(f, "{voice}"),
            Self::Sequential => f.write_str("sequential"),
            Self::Random => f.write_str("random"),
        }
    }
}

impl FromStr for VoiceChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            other => other.parse().map(Self::Fixed),
        }
    }
}

impl TryFrom<String> for VoiceChoice {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<VoiceChoice> for String {
    fn from(choice: VoiceChoice) -> Self {
        choice.to_string()
    }
}

/// Voice and timing settings for a listening test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningOptions {
    /// Speaking rate multiplier
    pub speed: f32,
    /// Voice for Korean narration
    pub korean_voice: Voice,
    pub female_voice: VoiceChoice,
    pub male_voice: VoiceChoice,
    pub line_gap_ms: u32,
    pub question_gap_secs: u32,
}

impl Default for ListeningOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            korean_voice: Voice::Fable,
            female_voice: VoiceChoice::Fixed(Voice::Alloy),
            male_voice: VoiceChoice::Fixed(Voice::Echo),
            line_gap_ms: 200,
            question_gap_secs: 5,
        }
    }
}

impl ListeningOptions {
    /// # Errors
    ///
    /// Returns `InputValidation` for an out-of-range speed or gap, or a
    /// fixed voice that does not match its speaker's gender
    pub fn validate(&self) -> Result<()> {
        check_speed(self.speed)?;
        if !LINE_GAP_MS.contains(&self.line_gap_ms) {
            return Err(Error::invalid(format!(
                "line gap must be {}-{} ms",
                LINE_GAP_MS.start(),
                LINE_GAP_MS.end()
            )));
        }
        if !QUESTION_GAP_SECS.contains(&self.question_gap_secs) {
            return Err(Error::invalid(format!(
                "question gap must be {}-{} s",
                QUESTION_GAP_SECS.start(),
                QUESTION_GAP_SECS.end()
            )));
        }
        if let VoiceChoice::Fixed(voice) = self.female_voice
            && !Voice::FEMALE.contains(&voice)
        {
            return Err(Error::invalid(format!("{voice} is not a female voice")));
        }
        if let VoiceChoice::Fixed(voice) = self.male_voice
            && !Voice::MALE.contains(&voice)
        {
            return Err(Error::invalid(format!("{voice} is not a male voice")));
        }
        Ok(())
    }
}

/// A line with its assigned voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedLine {
    pub speaker: Speaker,
    pub voice: Voice,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedQuestion {
    pub number: Option<u32>,
    pub lines: Vec<PlannedLine>,
}

/// Parsed script with voices assigned, ready to render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListeningPlan {
    pub questions: Vec<PlannedQuestion>,
    pub speed: f32,
    pub line_gap_ms: u32,
    pub question_gap_secs: u32,
}

impl ListeningPlan {
    /// Parse `script` and assign voices
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` for invalid options or a script with nothing to read
    pub fn new(script: &str, options: &ListeningOptions) -> Result<Self> {
        Self::with_rng(script, options, &mut rand::thread_rng())
    }

    /// [`ListeningPlan::new`] with a caller-supplied random source
    ///
    /// # Errors
    ///
    /// Same as [`ListeningPlan::new`]
    pub fn with_rng<R: Rng + ?Sized>(
        script: &str,
        options: &ListeningOptions,
        rng: &mut R,
    ) -> Result<Self> {
        options.validate()?;
        let questions = parse_script(script);
        if questions.is_empty() {
            return Err(Error::invalid("script has no lines to read"));
        }

        let questions = questions
            .into_iter()
            .enumerate()
            .map(|(index, question)| {
                let female = options.female_voice.pick(Gender::Female, index, rng);
                let male = options.male_voice.pick(Gender::Male, index, rng);
                let lines = question
                    .lines
                    .into_iter()
                    .map(|line| PlannedLine {
                        voice: match line.speaker {
                            Speaker::Narrator => options.korean_voice,
                            Speaker::Female => female,
                            Speaker::Male => male,
                        },
                        speaker: line.speaker,
                        text: line.text,
                    })
                    .collect();
                PlannedQuestion {
                    number: question.number,
                    lines,
                }
            })
            .collect();

        Ok(Self {
            questions,
            speed: options.speed,
            line_gap_ms: options.line_gap_ms,
            question_gap_secs: options.question_gap_secs,
        })
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.questions.iter().map(|q| q.lines.len()).sum()
    }
}

/// Rendered listening test
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    /// 16-bit mono WAV
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub lines: usize,
}

/// Synthesize every line and join them into one WAV
///
/// Lines within a question are separated by the line gap, questions by the
/// question gap.
///
/// # Errors
///
/// Returns `Speech` if synthesis fails, `Audio` if clips disagree on sample
/// rate or the WAV cannot be written
pub async fn render(plan: &ListeningPlan, synth: &dyn SpeechSynthesizer) -> Result<RenderedAudio> {
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate: Option<u32> = None;
    let mut lines = 0;

    for (q_index, question) in plan.questions.iter().enumerate() {
        for (l_index, line) in question.lines.iter().enumerate() {
            let clip = synth.synthesize(&line.text, line.voice, plan.speed).await?;
            let rate = *sample_rate.get_or_insert(clip.sample_rate);
            if clip.sample_rate != rate {
                return Err(Error::Audio(format!(
                    "sample rate changed from {rate} Hz to {} Hz",
                    clip.sample_rate
                )));
            }

            if l_index > 0 {
                samples.extend(AudioClip::silence(plan.line_gap_ms, rate).samples);
            } else if q_index > 0 {
                samples.extend(AudioClip::silence(plan.question_gap_secs * 1000, rate).samples);
            }
            samples.extend(clip.samples);
            lines += 1;
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| Error::invalid("script has no lines to read"))?;
    let audio = AudioClip::new(samples, sample_rate);
    let wav = samples_to_wav(&audio.samples, sample_rate)?;

    tracing::info!(
        synth = synth.name(),
        questions = plan.questions.len(),
        lines,
        duration_ms = audio.duration_ms(),
        "listening test rendered"
    );

    Ok(RenderedAudio {
        wav,
        sample_rate,
        duration_ms: audio.duration_ms(),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    /// Returns one sample per character so lengths are easy to check
    struct Beeper {
        rate: u32,
        calls: Mutex<Vec<(String, Voice)>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for Beeper {
        async fn synthesize(&self, text: &str, voice: Voice, _speed: f32) -> Result<AudioClip> {
            self.calls.lock().unwrap().push((text.to_string(), voice));
            Ok(AudioClip::new(vec![0.5; text.len()], self.rate))
        }

        fn name(&self) -> &'static str {
            "beeper"
        }
    }

    const SCRIPT: &str = "1. 대화를 듣고 답하시오.\nW: Hi.\nM: Hello.\n2. W: Bye.\nM: See you.";

    #[test]
    fn voice_choice_parsing() {
        assert_eq!("random".parse::<VoiceChoice>().unwrap(), VoiceChoice::Random);
        assert_eq!("Sequential".parse::<VoiceChoice>().unwrap(), VoiceChoice::Sequential);
        assert_eq!(
            "onyx".parse::<VoiceChoice>().unwrap(),
            VoiceChoice::Fixed(Voice::Onyx)
        );
        assert!("loud".parse::<VoiceChoice>().is_err());

        let options: ListeningOptions =
            serde_json::from_str(r#"{"female_voice": "sequential", "speed": 1.2}"#).unwrap();
        assert_eq!(options.female_voice, VoiceChoice::Sequential);
        assert_eq!(options.male_voice, VoiceChoice::Fixed(Voice::Echo));
    }

    #[test]
    fn options_are_range_checked() {
        assert!(ListeningOptions::default().validate().is_ok());
        let bad = [
            ListeningOptions {
                speed: 2.0,
                ..ListeningOptions::default()
            },
            ListeningOptions {
                line_gap_ms: 10,
                ..ListeningOptions::default()
            },
            ListeningOptions {
                question_gap_secs: 20,
                ..ListeningOptions::default()
            },
            ListeningOptions {
                male_voice: VoiceChoice::Fixed(Voice::Nova),
                ..ListeningOptions::default()
            },
        ];
        for options in bad {
            assert!(matches!(options.validate(), Err(Error::InputValidation(_))));
        }
    }

    #[test]
    fn plan_assigns_fixed_voices() {
        let plan = ListeningPlan::new(SCRIPT, &ListeningOptions::default()).unwrap();

        assert_eq!(plan.questions.len(), 2);
        assert_eq!(plan.line_count(), 5);
        let first: Vec<Voice> = plan.questions[0].lines.iter().map(|l| l.voice).collect();
        assert_eq!(first, [Voice::Fable, Voice::Alloy, Voice::Echo]);
    }

    #[test]
    fn sequential_rotates_by_question() {
        let options = ListeningOptions {
            female_voice: VoiceChoice::Sequential,
            male_voice: VoiceChoice::Sequential,
            ..ListeningOptions::default()
        };
        let plan = ListeningPlan::new(SCRIPT, &options).unwrap();

        assert_eq!(plan.questions[0].lines[1].voice, Voice::Alloy);
        assert_eq!(plan.questions[1].lines[0].voice, Voice::Fable);
        assert_eq!(plan.questions[0].lines[2].voice, Voice::Echo);
        assert_eq!(plan.questions[1].lines[1].voice, Voice::Onyx);
    }

    #[test]
    fn random_stays_within_gender() {
        let options = ListeningOptions {
            female_voice: VoiceChoice::Random,
            male_voice: VoiceChoice::Random,
            ..ListeningOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let plan = ListeningPlan::with_rng(SCRIPT, &options, &mut rng).unwrap();

        for line in plan.questions.iter().flat_map(|q| &q.lines) {
            match line.speaker {
                Speaker::Female => assert!(Voice::FEMALE.contains(&line.voice)),
                Speaker::Male => assert!(Voice::MALE.contains(&line.voice)),
                Speaker::Narrator => assert_eq!(line.voice, Voice::Fable),
            }
        }
    }

    #[test]
    fn empty_script_rejected() {
        let err = ListeningPlan::new("---\n\n", &ListeningOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InputValidation(_)));
    }

    #[tokio::test]
    async fn render_inserts_gaps() {
        let options = ListeningOptions {
            line_gap_ms: 100,
            question_gap_secs: 1,
            ..ListeningOptions::default()
        };
        let plan = ListeningPlan::new("1. W: Hi.\nM: Yo.\n2. W: Bye.", &options).unwrap();
        let synth = Beeper {
            rate: 1000,
            calls: Mutex::new(Vec::new()),
        };

        let rendered = render(&plan, &synth).await.unwrap();

        // 3 + 100 + 3 speech/line-gap samples, 1000 question gap, 4 speech
        let expected = 3 + 100 + 3 + 1000 + 4;
        assert_eq!(rendered.lines, 3);
        assert_eq!(rendered.sample_rate, 1000);
        assert_eq!(rendered.duration_ms, expected);

        let reader = hound::WavReader::new(std::io::Cursor::new(rendered.wav)).unwrap();
        assert_eq!(reader.len() as u64, expected);
        assert_eq!(synth.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn render_rejects_mixed_sample_rates() {
        struct Mixed(Mutex<u32>);

        #[async_trait]
        impl SpeechSynthesizer for Mixed {
            async fn synthesize(&self, _: &str, _: Voice, _: f32) -> Result<AudioClip> {
                let mut rate = self.0.lock().unwrap();
                *rate += 1000;
                Ok(AudioClip::new(vec![0.0; 4], *rate))
            }

            fn name(&self) -> &'static str {
                "mixed"
            }
        }

        let plan = ListeningPlan::new("W: One.\nW: Two.", &ListeningOptions::default()).unwrap();
        let err = render(&plan, &Mixed(Mutex::new(0))).await.unwrap_err();
        assert!(matches!(err, Error::Audio(_)));
    }
}
