//! Roadmap analysis: turns an assignment brief into an ordered list of milestones.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{Assignment, Milestone, MilestoneStatus};
use crate::error::{CoreError, Result};
use crate::generator::{generate_as, ContentGenerator, GenerationPrompt, ModelTier, ResultSchema};
use crate::store::AssignmentStore;
use crate::util::fill_template;

/// What the learner provides when creating an assignment.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDraft {
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub learning_outcome: String,
  pub deadline: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GeneratedRoadmap {
  milestones: Vec<GeneratedMilestone>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedMilestone {
  title: String,
  #[serde(default)]
  description: String,
  #[serde(default)]
  estimated_minutes: u32,
}

#[derive(Clone)]
pub struct RoadmapPlanner {
  store: AssignmentStore,
  generator: Arc<dyn ContentGenerator>,
  prompts: Arc<Prompts>,
  timeout: Duration,
}

impl RoadmapPlanner {
  pub fn new(store: AssignmentStore, generator: Arc<dyn ContentGenerator>, prompts: Arc<Prompts>, timeout: Duration) -> Self {
    Self { store, generator, prompts, timeout }
  }

  /// Generate the roadmap for a draft and store the resulting assignment.
  #[instrument(level = "info", skip(self, draft), fields(title_len = draft.title.len(), deadline = %draft.deadline))]
  pub async fn plan(&self, draft: AssignmentDraft) -> Result<Arc<Assignment>> {
    let now = Utc::now();
    if draft.title.trim().is_empty() {
      return Err(CoreError::InvalidState("assignment title is empty".into()));
    }
    if draft.deadline <= now {
      return Err(CoreError::InvalidState(format!("deadline {} is in the past", draft.deadline)));
    }

    let deadline = draft.deadline.to_rfc3339();
    let user = fill_template(
      &self.prompts.roadmap_user_template,
      &[
        ("title", draft.title.as_str()),
        ("description", draft.description.as_str()),
        ("learning_outcome", draft.learning_outcome.as_str()),
        ("deadline", deadline.as_str()),
      ],
    );
    let prompt = GenerationPrompt {
      system: self.prompts.roadmap_system.clone(),
      user,
      temperature: 0.4,
      tier: ModelTier::Strong,
    };
    let roadmap: GeneratedRoadmap =
      generate_as(self.generator.as_ref(), &prompt, &ResultSchema::roadmap(), self.timeout).await?;

    let assignment = build_assignment(draft, roadmap, now)?;
    info!(target: "mastery", id = %assignment.id, milestones = assignment.milestones.len(), "Roadmap generated");
    self.store.insert(assignment).await
  }
}

fn build_assignment(draft: AssignmentDraft, roadmap: GeneratedRoadmap, now: DateTime<Utc>) -> Result<Assignment> {
  let steps: Vec<GeneratedMilestone> = roadmap
    .milestones
    .into_iter()
    .filter(|m| !m.title.trim().is_empty())
    .collect();
  if steps.is_empty() {
    return Err(CoreError::GenerationFailed("roadmap has no milestones".into()));
  }
  let deadlines = spread_deadlines(now, draft.deadline, steps.len());
  let milestones = steps
    .into_iter()
    .zip(deadlines)
    .map(|(m, deadline)| Milestone {
      id: Uuid::new_v4().to_string(),
      title: m.title.trim().to_string(),
      description: m.description,
      estimated_minutes: m.estimated_minutes.max(1),
      deadline,
      status: MilestoneStatus::Todo,
      mini_course: None,
    })
    .collect();

  Ok(Assignment {
    id: Uuid::new_v4().to_string(),
    title: draft.title.trim().to_string(),
    description: draft.description,
    learning_outcome: draft.learning_outcome,
    deadline: draft.deadline,
    milestones,
    overall_progress: 0,
    at_risk: false,
    current_scaffolding_task: None,
    validation_history: vec![],
  })
}

/// Evenly spaced due dates between `now` and `deadline`; the last one is the deadline itself.
fn spread_deadlines(now: DateTime<Utc>, deadline: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
  let span = deadline - now;
  (1..=n)
    .map(|i| {
      if i == n {
        deadline
      } else {
        now + span * i as i32 / n as i32
      }
    })
    .collect()
}
