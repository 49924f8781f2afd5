//! Domain models: assignments, milestones, mini-courses, debate turns and scaffolding tasks.
//!
//! Serialized in camelCase, the shape the learner UI and the persistence sink exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completion state of a milestone. Independent of mastery.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneStatus {
  #[default]
  Todo,
  Completed,
}

impl MilestoneStatus {
  pub fn toggled(self) -> Self {
    match self {
      MilestoneStatus::Todo => MilestoneStatus::Completed,
      MilestoneStatus::Completed => MilestoneStatus::Todo,
    }
  }
}

/// Mastery verdict of a mini-course. `Untested` is only ever the pre-debate default.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MasteryStatus {
  #[default]
  Untested,
  Refined,
  Perfected,
}

impl MasteryStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, MasteryStatus::Untested)
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
  User,
  Model,
}

/// One entry of a debate transcript. Append-only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebateTurn {
  pub role: DebateRole,
  pub text: String,
  /// In [0, 100]; always 0 for user turns.
  pub intellectual_weight: f32,
}

/// Generated instructional unit cached on its milestone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MiniCourse {
  pub learning_outcome: String,
  pub overview: String,
  pub concepts: Vec<String>,
  pub practical_guide: String,
  pub formative_action: String,
  pub expert_tip: String,
  #[serde(default)]
  pub mastery_status: MasteryStatus,
  #[serde(default)]
  pub formative_task_completed: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub debate_history: Option<Vec<DebateTurn>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
  pub id: String,
  pub title: String,
  pub description: String,
  pub estimated_minutes: u32,
  pub deadline: DateTime<Utc>,
  #[serde(default)]
  pub status: MilestoneStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mini_course: Option<MiniCourse>,
}

/// Low-friction recovery task issued on academic freeze.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaffoldingTask {
  pub id: String,
  pub instruction: String,
  pub duration_seconds: u32,
  #[serde(default)]
  pub completed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RubricScore {
  pub criterion: String,
  pub score: f32,
  #[serde(default)]
  pub feedback: String,
}

/// Summative assessment outcome. Produced elsewhere; only appended to history here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
  pub overall_score: f32,
  #[serde(default)]
  pub rubric_scores: Vec<RubricScore>,
  #[serde(default)]
  pub strengths: Vec<String>,
  #[serde(default)]
  pub weaknesses: Vec<String>,
  #[serde(default)]
  pub recommendations: Vec<String>,
  pub alignment_score: f32,
  pub assessment_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
  pub id: String,
  pub title: String,
  pub description: String,
  pub learning_outcome: String,
  pub deadline: DateTime<Utc>,
  pub milestones: Vec<Milestone>,
  pub overall_progress: u8,
  #[serde(default)]
  pub at_risk: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_scaffolding_task: Option<ScaffoldingTask>,
  #[serde(default)]
  pub validation_history: Vec<ValidationResult>,
}

impl Assignment {
  pub fn milestone(&self, milestone_id: &str) -> Option<&Milestone> {
    self.milestones.iter().find(|m| m.id == milestone_id)
  }

  pub fn milestone_mut(&mut self, milestone_id: &str) -> Option<&mut Milestone> {
    self.milestones.iter_mut().find(|m| m.id == milestone_id)
  }

  pub fn completed_count(&self) -> usize {
    self
      .milestones
      .iter()
      .filter(|m| m.status == MilestoneStatus::Completed)
      .count()
  }

  /// Short "1. title\n2. title" listing fed to generation prompts as roadmap context.
  pub fn roadmap_summary(&self) -> String {
    self
      .milestones
      .iter()
      .enumerate()
      .map(|(i, m)| format!("{}. {}", i + 1, m.title))
      .collect::<Vec<_>>()
      .join("\n")
  }
}

/// round(100 * completed / total). `None` when there are no milestones.
pub fn progress_percent(completed: usize, total: usize) -> Option<u8> {
  if total == 0 {
    return None;
  }
  let pct = (100.0 * completed as f64 / total as f64).round();
  Some(pct.clamp(0.0, 100.0) as u8)
}
