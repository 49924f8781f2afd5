//! The content-generation seam.
//!
//! Every generation call site (roadmap, mini-course, debate turn, scaffolding task) goes
//! through `ContentGenerator::generate` with a prompt and a result schema, and gets back
//! JSON. `generate_as` adds the timeout and the typed decode on top.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use crate::error::{CoreError, Result};

/// Which model class a call site wants. Generators without tiers ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
  Fast,
  Strong,
}

#[derive(Clone, Debug)]
pub struct GenerationPrompt {
  pub system: String,
  pub user: String,
  pub temperature: f32,
  pub tier: ModelTier,
}

/// Named JSON schema describing the expected result shape.
#[derive(Clone, Debug)]
pub struct ResultSchema {
  pub name: &'static str,
  pub schema: Value,
}

pub const ROADMAP: &str = "roadmap";
pub const MINI_COURSE: &str = "mini_course";
pub const DEBATE_TURN: &str = "debate_turn";
pub const SCAFFOLDING_TASK: &str = "scaffolding_task";

impl ResultSchema {
  pub fn roadmap() -> Self {
    Self {
      name: ROADMAP,
      schema: json!({
        "type": "object",
        "required": ["milestones"],
        "properties": {
          "milestones": {
            "type": "array",
            "minItems": 1,
            "items": {
              "type": "object",
              "required": ["title", "description", "estimatedMinutes"],
              "properties": {
                "title": { "type": "string" },
                "description": { "type": "string" },
                "estimatedMinutes": { "type": "integer", "minimum": 1 }
              }
            }
          }
        }
      }),
    }
  }

  pub fn mini_course() -> Self {
    Self {
      name: MINI_COURSE,
      schema: json!({
        "type": "object",
        "required": ["learningOutcome", "overview", "concepts", "practicalGuide", "formativeAction", "expertTip"],
        "properties": {
          "learningOutcome": { "type": "string" },
          "overview": { "type": "string" },
          "concepts": { "type": "array", "items": { "type": "string" } },
          "practicalGuide": { "type": "string" },
          "formativeAction": { "type": "string" },
          "expertTip": { "type": "string" }
        }
      }),
    }
  }

  pub fn debate_turn() -> Self {
    Self {
      name: DEBATE_TURN,
      schema: json!({
        "type": "object",
        "required": ["text"],
        "properties": { "text": { "type": "string" } }
      }),
    }
  }

  pub fn scaffolding_task() -> Self {
    Self {
      name: SCAFFOLDING_TASK,
      schema: json!({
        "type": "object",
        "required": ["instruction", "durationSeconds"],
        "properties": {
          "instruction": { "type": "string" },
          "durationSeconds": { "type": "integer", "minimum": 1 }
        }
      }),
    }
  }
}

/// External text-generation collaborator: prompt + schema in, JSON out.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
  async fn generate(&self, prompt: &GenerationPrompt, schema: &ResultSchema) -> Result<Value>;
}

/// Run one generation under `timeout` and decode it into `T`.
/// Timeout expiry and decode errors are both `GenerationFailed`.
#[instrument(level = "info", skip(generator, prompt, schema), fields(schema = schema.name, timeout_ms = timeout.as_millis() as u64))]
pub async fn generate_as<T: DeserializeOwned>(
  generator: &dyn ContentGenerator,
  prompt: &GenerationPrompt,
  schema: &ResultSchema,
  timeout: Duration,
) -> Result<T> {
  let start = Instant::now();
  let raw = match tokio::time::timeout(timeout, generator.generate(prompt, schema)).await {
    Ok(Ok(v)) => v,
    Ok(Err(e)) => {
      error!(target: "mastery_backend", elapsed = ?start.elapsed(), error = %e, "Generation call failed");
      return Err(e);
    }
    Err(_) => {
      error!(target: "mastery_backend", elapsed = ?start.elapsed(), "Generation call timed out");
      return Err(CoreError::GenerationFailed(format!(
        "{} generation timed out after {}s",
        schema.name,
        timeout.as_secs()
      )));
    }
  };
  debug!(target: "mastery_backend", elapsed = ?start.elapsed(), "Generation response received");
  serde_json::from_value::<T>(raw).map_err(|e| {
    CoreError::GenerationFailed(format!("{} result did not match schema: {e}", schema.name))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  struct Fixed(Value);

  #[async_trait]
  impl ContentGenerator for Fixed {
    async fn generate(&self, _: &GenerationPrompt, _: &ResultSchema) -> Result<Value> {
      Ok(self.0.clone())
    }
  }

  struct Stalled;

  #[async_trait]
  impl ContentGenerator for Stalled {
    async fn generate(&self, _: &GenerationPrompt, _: &ResultSchema) -> Result<Value> {
      tokio::time::sleep(Duration::from_secs(3600)).await;
      Ok(Value::Null)
    }
  }

  #[derive(Deserialize)]
  struct Turn {
    text: String,
  }

  fn prompt() -> GenerationPrompt {
    GenerationPrompt { system: "s".into(), user: "u".into(), temperature: 0.5, tier: ModelTier::Fast }
  }

  #[tokio::test]
  async fn decodes_matching_json() {
    let g = Fixed(json!({ "text": "hello" }));
    let t: Turn = generate_as(&g, &prompt(), &ResultSchema::debate_turn(), Duration::from_secs(1))
      .await
      .unwrap();
    assert_eq!(t.text, "hello");
  }

  #[tokio::test]
  async fn schema_mismatch_is_generation_failure() {
    let g = Fixed(json!({ "nope": 1 }));
    let err = generate_as::<Turn>(&g, &prompt(), &ResultSchema::debate_turn(), Duration::from_secs(1))
      .await
      .err()
      .unwrap();
    assert!(matches!(err, CoreError::GenerationFailed(_)));
  }

  #[tokio::test(start_paused = true)]
  async fn timeout_is_generation_failure() {
    let err = generate_as::<Turn>(&Stalled, &prompt(), &ResultSchema::debate_turn(), Duration::from_secs(5))
      .await
      .err()
      .unwrap();
    match err {
      CoreError::GenerationFailed(msg) => assert!(msg.contains("timed out")),
      other => panic!("unexpected error: {other:?}"),
    }
  }
}
