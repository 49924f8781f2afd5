//! Offline fallback content.
//!
//! When no OpenAI key is configured the backend still has to answer every generation
//! call site, so `OfflineGenerator` returns small deterministic documents per schema.
//! Good enough for local development and demos; never pedagogically meaningful.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::generator::{
  ContentGenerator, GenerationPrompt, ResultSchema, DEBATE_TURN, MINI_COURSE, ROADMAP, SCAFFOLDING_TASK,
};

/// Built-in challenges cycled through by the offline debate partner.
const OFFLINE_CHALLENGES: &[&str] = &[
  "Explain the core idea in your own words, without repeating the course overview.",
  "What is the strongest objection to your position, and how would you answer it?",
  "Give a concrete example where this concept fails or needs qualification.",
  "How would you know you are wrong? Name the evidence that would change your mind.",
];

#[derive(Clone, Debug, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl ContentGenerator for OfflineGenerator {
  async fn generate(&self, prompt: &GenerationPrompt, schema: &ResultSchema) -> Result<Value> {
    debug!(target: "mastery_backend", schema = schema.name, prompt_len = prompt.user.len(), "Offline generation");
    match schema.name {
      ROADMAP => Ok(offline_roadmap()),
      MINI_COURSE => Ok(offline_mini_course()),
      DEBATE_TURN => Ok(offline_debate_turn(&prompt.user)),
      SCAFFOLDING_TASK => Ok(offline_scaffolding_task()),
      other => Err(CoreError::GenerationFailed(format!("offline generator has no content for schema '{other}'"))),
    }
  }
}

fn offline_roadmap() -> Value {
  json!({
    "milestones": [
      { "title": "Clarify the brief", "description": "Restate the task and list what a strong submission must show.", "estimatedMinutes": 30 },
      { "title": "Research core sources", "description": "Collect and annotate three key sources.", "estimatedMinutes": 90 },
      { "title": "Draft the argument", "description": "Write a first complete draft, ugly is fine.", "estimatedMinutes": 120 },
      { "title": "Revise and submit", "description": "Check against the outcome, polish and hand in.", "estimatedMinutes": 60 }
    ]
  })
}

fn offline_mini_course() -> Value {
  json!({
    "learningOutcome": "Explain the milestone's central idea and apply it to your assignment.",
    "overview": "This unit introduces the key ideas you need for this step of your roadmap.",
    "concepts": ["Core definition", "Common misconception", "Application to your assignment"],
    "practicalGuide": "Read the brief again, underline the verbs, and map each to one concept above.",
    "formativeAction": "Write three sentences connecting each concept to your assignment and save them.",
    "expertTip": "If you cannot explain it simply, you have found exactly what to study next."
  })
}

/// Picks a challenge from the transcript length so consecutive turns differ.
fn offline_debate_turn(user_prompt: &str) -> Value {
  let idx = user_prompt.lines().count() % OFFLINE_CHALLENGES.len();
  json!({ "text": OFFLINE_CHALLENGES[idx] })
}

fn offline_scaffolding_task() -> Value {
  json!({
    "instruction": "Open a blank document and write the assignment title plus one sentence on what you already know.",
    "durationSeconds": 180
  })
}
