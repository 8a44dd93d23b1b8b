//! Classroom tools built on the conversation relay

pub mod awards;
pub mod chart;
pub mod lesson_plan;
pub mod listening;

pub use awards::{AWARD_MODEL, AwardEntry, AwardRecommendation};
pub use chart::{ChartKind, ChartRequest, ChartSummary, DataTable, FrequencyTable, StemAndLeaf};
pub use lesson_plan::{LessonPlan, LessonPlanForm};
pub use listening::{ListeningOptions, ListeningPlan, RenderedAudio, VoiceChoice};
