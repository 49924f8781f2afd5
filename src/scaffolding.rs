//! Academic-freeze scaffolding.
//!
//! Zero progress with the deadline less than the freeze window away counts as a freeze.
//! The learner is then offered one generated micro-task with a countdown. The countdown
//! is a spawned task owned by this component: completing the micro-task or tearing down
//! the view aborts it. Reaching zero never completes the task by itself.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::{
  sync::{watch, Mutex},
  task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, Prompts};
use crate::domain::{Assignment, ScaffoldingTask};
use crate::error::{CoreError, Result};
use crate::generator::{generate_as, ContentGenerator, GenerationPrompt, ModelTier, ResultSchema};
use crate::store::AssignmentStore;
use crate::util::fill_template;

/// Freeze predicate. Suppressed once the current micro-task has been completed.
pub fn freeze_detected(assignment: &Assignment, now: DateTime<Utc>, window: chrono::Duration) -> bool {
  if matches!(&assignment.current_scaffolding_task, Some(t) if t.completed) {
    return false;
  }
  let remaining = assignment.deadline - now;
  assignment.overall_progress == 0 && remaining > chrono::Duration::zero() && remaining < window
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedTask {
  instruction: String,
  duration_seconds: i64,
}

/// A running countdown. Dropping it aborts the ticking task.
struct Countdown {
  task_id: String,
  remaining: watch::Receiver<u32>,
  handle: JoinHandle<()>,
}

impl Countdown {
  fn spawn(task_id: String, seconds: u32) -> Self {
    let (tx, rx) = watch::channel(seconds);
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(Duration::from_secs(1));
      ticker.tick().await;
      let mut left = seconds;
      while left > 0 {
        ticker.tick().await;
        left -= 1;
        tx.send_replace(left);
      }
    });
    Self { task_id, remaining: rx, handle }
  }
}

impl Drop for Countdown {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[derive(Clone)]
pub struct ScaffoldingIntervention {
  store: AssignmentStore,
  generator: Arc<dyn ContentGenerator>,
  prompts: Arc<Prompts>,
  timeout: Duration,
  freeze_window: chrono::Duration,
  countdowns: Arc<Mutex<HashMap<String, Countdown>>>,
}

impl ScaffoldingIntervention {
  pub fn new(
    store: AssignmentStore,
    generator: Arc<dyn ContentGenerator>,
    prompts: Arc<Prompts>,
    engine: &EngineConfig,
  ) -> Self {
    Self {
      store,
      generator,
      prompts,
      timeout: engine.generation_timeout(),
      freeze_window: engine.freeze_window(),
      countdowns: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Recomputed on every view of the assignment.
  pub async fn is_frozen(&self, assignment_id: &str) -> Result<bool> {
    let assignment = self.store.get(assignment_id).await?;
    Ok(freeze_detected(&assignment, Utc::now(), self.freeze_window))
  }

  /// Generate a fresh micro-task and make it the assignment's single current task.
  #[instrument(level = "info", skip(self), fields(%assignment_id))]
  pub async fn generate(&self, assignment_id: &str) -> Result<ScaffoldingTask> {
    let assignment = self.store.get(assignment_id).await?;
    if !freeze_detected(&assignment, Utc::now(), self.freeze_window) {
      debug!(target: "scaffolding", %assignment_id, "Generating micro-task without an active freeze");
    }

    let deadline = assignment.deadline.to_rfc3339();
    let user = fill_template(
      &self.prompts.scaffolding_user_template,
      &[
        ("title", assignment.title.as_str()),
        ("description", assignment.description.as_str()),
        ("deadline", deadline.as_str()),
      ],
    );
    let prompt = GenerationPrompt {
      system: self.prompts.scaffolding_system.clone(),
      user,
      temperature: 0.6,
      tier: ModelTier::Fast,
    };
    let generated: GeneratedTask =
      generate_as(self.generator.as_ref(), &prompt, &ResultSchema::scaffolding_task(), self.timeout).await?;
    let task = into_task(generated)?;

    let stored = task.clone();
    self
      .store
      .update(assignment_id, |a| {
        a.current_scaffolding_task = Some(stored);
        Ok(())
      })
      .await?;
    // The superseded task's countdown goes with it.
    self.countdowns.lock().await.remove(assignment_id);

    info!(target: "scaffolding", %assignment_id, task_id = %task.id, duration_seconds = task.duration_seconds, "Micro-task issued");
    Ok(task)
  }

  /// Begin (or restart) the countdown for the current task.
  #[instrument(level = "info", skip(self), fields(%assignment_id))]
  pub async fn start(&self, assignment_id: &str) -> Result<watch::Receiver<u32>> {
    let assignment = self.store.get(assignment_id).await?;
    let task = assignment
      .current_scaffolding_task
      .as_ref()
      .ok_or_else(|| CoreError::InvalidState(format!("assignment {assignment_id} has no micro-task")))?;
    if task.completed {
      return Err(CoreError::InvalidState(format!("micro-task {} is already completed", task.id)));
    }
    let countdown = Countdown::spawn(task.id.clone(), task.duration_seconds);
    let rx = countdown.remaining.clone();
    // Replacing drops (and aborts) any previous countdown.
    self.countdowns.lock().await.insert(assignment_id.to_string(), countdown);
    debug!(target: "scaffolding", %assignment_id, task_id = %task.id, seconds = task.duration_seconds, "Countdown started");
    Ok(rx)
  }

  /// Seconds left on the running countdown, if any.
  pub async fn remaining(&self, assignment_id: &str) -> Option<u32> {
    self
      .countdowns
      .lock()
      .await
      .get(assignment_id)
      .map(|c| *c.remaining.borrow())
  }

  /// Teardown of the owning view: cancel the countdown. Returns whether one was running.
  pub async fn stop(&self, assignment_id: &str) -> bool {
    let stopped = self.countdowns.lock().await.remove(assignment_id);
    if let Some(c) = &stopped {
      debug!(target: "scaffolding", %assignment_id, task_id = %c.task_id, "Countdown cancelled");
    }
    stopped.is_some()
  }

  /// Mark the current micro-task done and cancel its countdown.
  #[instrument(level = "info", skip(self), fields(%assignment_id))]
  pub async fn complete(&self, assignment_id: &str) -> Result<Arc<Assignment>> {
    let updated = self
      .store
      .update(assignment_id, |a| {
        let task = a
          .current_scaffolding_task
          .as_mut()
          .ok_or_else(|| CoreError::InvalidState(format!("assignment {assignment_id} has no micro-task")))?;
        task.completed = true;
        Ok(())
      })
      .await?;
    self.countdowns.lock().await.remove(assignment_id);
    info!(target: "scaffolding", %assignment_id, "Micro-task completed");
    Ok(updated)
  }
}

fn into_task(generated: GeneratedTask) -> Result<ScaffoldingTask> {
  let instruction = generated.instruction.trim().to_string();
  if instruction.is_empty() {
    return Err(CoreError::GenerationFailed("micro-task instruction is empty".into()));
  }
  let duration_seconds = u32::try_from(generated.duration_seconds)
    .ok()
    .filter(|d| *d > 0)
    .ok_or_else(|| {
      warn!(target: "scaffolding", duration = generated.duration_seconds, "Rejected micro-task duration");
      CoreError::GenerationFailed(format!("invalid durationSeconds {}", generated.duration_seconds))
    })?;
  Ok(ScaffoldingTask {
    id: Uuid::new_v4().to_string(),
    instruction,
    duration_seconds,
    completed: false,
  })
}
