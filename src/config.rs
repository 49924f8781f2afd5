//! Loading mastery configuration (prompts + engine tuning) from TOML.
//!
//! See `MasteryConfig`, `Prompts` and `EngineConfig` for the expected schema.
//! Every field is optional; missing ones fall back to the defaults below.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MasteryConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub engine: EngineConfig,
}

/// Numeric knobs of the core. Thresholds mirror the behavior learners see in the UI.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Upper bound on any single generation call; expiry is a generation failure.
  pub generation_timeout_secs: u64,
  /// Running tension above which the finalize affordance is offered.
  pub can_finalize_threshold: f32,
  /// Weight recorded on the opening challenge (not part of the running tension).
  pub opening_weight: f32,
  /// Deadline window (hours) inside which zero progress counts as academic freeze.
  pub freeze_window_hours: i64,
}

const DEFAULT_FREEZE_WINDOW_HOURS: i64 = 48;

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      generation_timeout_secs: 45,
      can_finalize_threshold: 75.0,
      opening_weight: 50.0,
      freeze_window_hours: DEFAULT_FREEZE_WINDOW_HOURS,
    }
  }
}

impl EngineConfig {
  pub fn generation_timeout(&self) -> Duration {
    Duration::from_secs(self.generation_timeout_secs.max(1))
  }

  /// Non-positive or out-of-range values fall back to the 48h default.
  pub fn freeze_window(&self) -> chrono::Duration {
    chrono::Duration::try_hours(self.freeze_window_hours)
      .filter(|w| *w > chrono::Duration::zero())
      .unwrap_or_else(|| {
        warn!(target: "mastery_backend", hours = self.freeze_window_hours, "Invalid freeze_window_hours; using default");
        chrono::Duration::hours(DEFAULT_FREEZE_WINDOW_HOURS)
      })
  }
}

/// Prompts used by the content generator. Placeholders are `{key}` (see `util::fill_template`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Roadmap analysis
  pub roadmap_system: String,
  pub roadmap_user_template: String,
  // Mini-course per milestone
  pub mini_course_system: String,
  pub mini_course_user_template: String,
  // Debate
  pub debate_system: String,
  pub debate_opening_template: String,
  pub debate_continue_template: String,
  // Academic freeze
  pub scaffolding_system: String,
  pub scaffolding_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      roadmap_system: "You are an academic planning assistant. Respond ONLY with strict JSON.".into(),
      roadmap_user_template: "Assignment: {title}\nDescription: {description}\nLearning outcome: {learning_outcome}\nDeadline: {deadline}\n\nBreak the work into 3-7 sequential milestones. Return JSON {\"milestones\": [{\"title\": string, \"description\": string, \"estimatedMinutes\": number}]}.".into(),
      mini_course_system: "You are an expert tutor writing compact mini-courses. Respond ONLY with strict JSON.".into(),
      mini_course_user_template: "Assignment: {assignment_title}\nAssignment outcome: {assignment_outcome}\nRoadmap:\n{roadmap}\n\nMilestone: {milestone_title}\nMilestone description: {milestone_description}\n\nWrite a mini-course for this milestone. Return JSON with fields: learningOutcome, overview, concepts (array of strings), practicalGuide, formativeAction (one concrete task the learner must do), expertTip.".into(),
      debate_system: "You are a Socratic examiner. Probe for real understanding, concede nothing without argument, keep replies under 120 words. Respond ONLY with strict JSON {\"text\": string}.".into(),
      debate_opening_template: "Milestone: {milestone_title}\nAssignment: {assignment_title}\nKey concepts: {concepts}\nFormative action the learner completed: {formative_action}\n\nOpen the debate; challenge understanding of core concepts.".into(),
      debate_continue_template: "Milestone: {milestone_title}\nFormative action: {formative_action}\n\nTranscript so far:\n{transcript}\n\nContinue the debate: answer the learner's last argument and press on the weakest point.".into(),
      scaffolding_system: "You are a study coach helping a stalled learner restart. Respond ONLY with strict JSON.".into(),
      scaffolding_user_template: "Assignment: {title}\nDescription: {description}\nDeadline: {deadline}\nNo progress has been made yet.\n\nGive ONE low-friction task that takes under 5 minutes. Return JSON {\"instruction\": string, \"durationSeconds\": number}.".into(),
    }
  }
}

/// Attempt to load `MasteryConfig` from MASTERY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_mastery_config_from_env() -> Option<MasteryConfig> {
  let path = std::env::var("MASTERY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_mastery_config(&s) {
      Ok(cfg) => {
        info!(target: "mastery_backend", %path, "Loaded mastery config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mastery_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mastery_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_mastery_config(s: &str) -> Result<MasteryConfig, toml::de::Error> {
  toml::from_str::<MasteryConfig>(s)
}
