//! Per-milestone lazy mini-course cache with single-flight generation.
//!
//! A milestone's mini-course is generated at most once and then lives on the milestone
//! itself. While a generation is pending, every other `ensure` for the same milestone
//! joins the same shared future instead of issuing another request.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{Assignment, MasteryStatus, Milestone, MiniCourse};
use crate::error::{CoreError, Result};
use crate::generator::{generate_as, ContentGenerator, GenerationPrompt, ModelTier, ResultSchema};
use crate::store::AssignmentStore;
use crate::util::fill_template;

type MilestoneKey = (String, String);
type PendingCourse = Shared<BoxFuture<'static, Result<MiniCourse>>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedCourse {
  learning_outcome: String,
  overview: String,
  concepts: Vec<String>,
  practical_guide: String,
  formative_action: String,
  expert_tip: String,
}

impl GeneratedCourse {
  fn into_mini_course(self) -> Result<MiniCourse> {
    let required = [
      ("learningOutcome", &self.learning_outcome),
      ("overview", &self.overview),
      ("practicalGuide", &self.practical_guide),
      ("formativeAction", &self.formative_action),
      ("expertTip", &self.expert_tip),
    ];
    if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
      return Err(CoreError::GenerationFailed(format!("mini-course field '{field}' is empty")));
    }
    Ok(MiniCourse {
      learning_outcome: self.learning_outcome,
      overview: self.overview,
      concepts: self.concepts.into_iter().filter(|c| !c.trim().is_empty()).collect(),
      practical_guide: self.practical_guide,
      formative_action: self.formative_action,
      expert_tip: self.expert_tip,
      mastery_status: MasteryStatus::Untested,
      formative_task_completed: false,
      debate_history: None,
    })
  }
}

#[derive(Clone)]
pub struct MiniCourseCache {
  store: AssignmentStore,
  generator: Arc<dyn ContentGenerator>,
  prompts: Arc<Prompts>,
  timeout: Duration,
  inflight: Arc<Mutex<HashMap<MilestoneKey, PendingCourse>>>,
}

impl MiniCourseCache {
  pub fn new(
    store: AssignmentStore,
    generator: Arc<dyn ContentGenerator>,
    prompts: Arc<Prompts>,
    timeout: Duration,
  ) -> Self {
    Self { store, generator, prompts, timeout, inflight: Arc::new(Mutex::new(HashMap::new())) }
  }

  /// Return the milestone's mini-course, generating it on first use.
  #[instrument(level = "info", skip(self), fields(%assignment_id, %milestone_id))]
  pub async fn ensure(&self, assignment_id: &str, milestone_id: &str) -> Result<MiniCourse> {
    let key = (assignment_id.to_string(), milestone_id.to_string());
    let pending = {
      // The store check happens under the registry lock: a finishing generation writes
      // the store before it leaves the registry, so we see one or the other.
      let mut inflight = self.inflight.lock().await;
      let assignment = self.store.get(assignment_id).await?;
      let milestone = find_milestone(&assignment, milestone_id)?;
      if let Some(course) = &milestone.mini_course {
        debug!(target: "mastery", %assignment_id, %milestone_id, "Mini-course cache hit");
        return Ok(course.clone());
      }
      match inflight.get(&key) {
        Some(pending) => {
          debug!(target: "mastery", %assignment_id, %milestone_id, "Joining in-flight mini-course generation");
          pending.clone()
        }
        None => {
          let prompt = self.prompt_for(&assignment, milestone);
          let pending = self.clone().fill(key.clone(), prompt).boxed().shared();
          inflight.insert(key, pending.clone());
          // Drive it independently of waiters so the registry entry is always released.
          tokio::spawn(pending.clone());
          pending
        }
      }
    };
    pending.await
  }

  /// True while a generation for this milestone is pending.
  pub async fn is_generating(&self, assignment_id: &str, milestone_id: &str) -> bool {
    self
      .inflight
      .lock()
      .await
      .contains_key(&(assignment_id.to_string(), milestone_id.to_string()))
  }

  async fn fill(self, key: MilestoneKey, prompt: GenerationPrompt) -> Result<MiniCourse> {
    let result = self.generate_and_store(&key, &prompt).await;
    self.inflight.lock().await.remove(&key);
    result
  }

  async fn generate_and_store(&self, key: &MilestoneKey, prompt: &GenerationPrompt) -> Result<MiniCourse> {
    let (assignment_id, milestone_id) = key;
    let generated: GeneratedCourse =
      match generate_as(self.generator.as_ref(), prompt, &ResultSchema::mini_course(), self.timeout).await {
        Ok(g) => g,
        Err(e) => {
          warn!(target: "mastery", %assignment_id, %milestone_id, error = %e, "Mini-course generation failed; milestone left without course");
          return Err(e);
        }
      };
    let course = generated.into_mini_course()?;

    let mut stored = course.clone();
    self
      .store
      .update(assignment_id, |a| {
        let milestone = a
          .milestone_mut(milestone_id)
          .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} disappeared during generation")))?;
        match &milestone.mini_course {
          // Never overwrite learner state that is already cached.
          Some(existing) => stored = existing.clone(),
          None => milestone.mini_course = Some(course),
        }
        Ok(())
      })
      .await?;
    info!(target: "mastery", %assignment_id, %milestone_id, concepts = stored.concepts.len(), "Mini-course cached");
    Ok(stored)
  }

  fn prompt_for(&self, assignment: &Assignment, milestone: &Milestone) -> GenerationPrompt {
    let roadmap = assignment.roadmap_summary();
    let user = fill_template(
      &self.prompts.mini_course_user_template,
      &[
        ("assignment_title", assignment.title.as_str()),
        ("assignment_outcome", assignment.learning_outcome.as_str()),
        ("roadmap", roadmap.as_str()),
        ("milestone_title", milestone.title.as_str()),
        ("milestone_description", milestone.description.as_str()),
      ],
    );
    GenerationPrompt {
      system: self.prompts.mini_course_system.clone(),
      user,
      temperature: 0.7,
      tier: ModelTier::Strong,
    }
  }
}

pub(crate) fn find_milestone<'a>(assignment: &'a Assignment, milestone_id: &str) -> Result<&'a Milestone> {
  assignment
    .milestone(milestone_id)
    .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} not in assignment {}", assignment.id)))
}
