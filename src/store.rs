//! Assignment store: the single owner of assignment state.
//!
//! Assignments live as `Arc<Assignment>` snapshots. Every mutation clones the current
//! snapshot, edits the copy and swaps the `Arc`, so a caller holding an old snapshot can
//! diff it against the new one. Each new snapshot is handed to the `AssignmentSink`, and
//! removals are reported to it through `forget`.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::{progress_percent, Assignment, ValidationResult};
use crate::error::{CoreError, Result};
use crate::scaffolding::freeze_detected;

/// Durability collaborator. Receives every full updated assignment and every removal.
#[async_trait]
pub trait AssignmentSink: Send + Sync {
  async fn persist(&self, assignment: Arc<Assignment>);

  async fn forget(&self, assignment_id: &str);
}

/// Default sink: logs the replacement, persists nothing.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AssignmentSink for LogSink {
  async fn persist(&self, assignment: Arc<Assignment>) {
    debug!(target: "mastery", id = %assignment.id, progress = assignment.overall_progress, at_risk = assignment.at_risk, "Assignment snapshot replaced");
  }

  async fn forget(&self, assignment_id: &str) {
    debug!(target: "mastery", id = %assignment_id, "Assignment forgotten");
  }
}

#[derive(Clone)]
pub struct AssignmentStore {
  by_id: Arc<RwLock<HashMap<String, Arc<Assignment>>>>,
  sink: Arc<dyn AssignmentSink>,
  freeze_window: chrono::Duration,
}

impl AssignmentStore {
  pub fn new(sink: Arc<dyn AssignmentSink>, freeze_window: chrono::Duration) -> Self {
    Self {
      by_id: Arc::new(RwLock::new(HashMap::new())),
      sink,
      freeze_window,
    }
  }

  /// Insert (or replace) an assignment. Progress and risk are normalized on the way in.
  #[instrument(level = "info", skip(self, assignment), fields(id = %assignment.id, milestones = assignment.milestones.len()))]
  pub async fn insert(&self, mut assignment: Assignment) -> Result<Arc<Assignment>> {
    assignment.overall_progress = progress_percent(assignment.completed_count(), assignment.milestones.len())
      .ok_or_else(|| CoreError::InvalidState(format!("assignment {} has no milestones", assignment.id)))?;
    assignment.at_risk = freeze_detected(&assignment, Utc::now(), self.freeze_window);
    let snapshot = Arc::new(assignment);
    self.by_id.write().await.insert(snapshot.id.clone(), snapshot.clone());
    info!(target: "mastery", id = %snapshot.id, "Assignment stored");
    self.sink.persist(snapshot.clone()).await;
    Ok(snapshot)
  }

  pub async fn get(&self, id: &str) -> Result<Arc<Assignment>> {
    self
      .by_id
      .read()
      .await
      .get(id)
      .cloned()
      .ok_or_else(|| CoreError::NotFound(format!("assignment {id}")))
  }

  pub async fn list(&self) -> Vec<Arc<Assignment>> {
    let mut all: Vec<_> = self.by_id.read().await.values().cloned().collect();
    all.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.id.cmp(&b.id)));
    all
  }

  pub async fn remove(&self, id: &str) -> Result<Arc<Assignment>> {
    let removed = self
      .by_id
      .write()
      .await
      .remove(id)
      .ok_or_else(|| CoreError::NotFound(format!("assignment {id}")))?;
    info!(target: "mastery", %id, "Assignment removed");
    self.sink.forget(id).await;
    Ok(removed)
  }

  /// Copy-on-write update. `edit` works on a private clone; on error nothing is replaced.
  pub async fn update<F>(&self, id: &str, edit: F) -> Result<Arc<Assignment>>
  where
    F: FnOnce(&mut Assignment) -> Result<()>,
  {
    let snapshot = {
      let mut by_id = self.by_id.write().await;
      let current = by_id
        .get(id)
        .ok_or_else(|| CoreError::NotFound(format!("assignment {id}")))?;
      let mut next = Assignment::clone(current);
      edit(&mut next)?;
      next.at_risk = freeze_detected(&next, Utc::now(), self.freeze_window);
      let next = Arc::new(next);
      by_id.insert(id.to_string(), next.clone());
      next
    };
    self.sink.persist(snapshot.clone()).await;
    Ok(snapshot)
  }

  /// Flip a milestone between TODO and COMPLETED and recompute overall progress.
  #[instrument(level = "info", skip(self), fields(%assignment_id, %milestone_id))]
  pub async fn toggle(&self, assignment_id: &str, milestone_id: &str) -> Result<Arc<Assignment>> {
    let updated = self
      .update(assignment_id, |a| {
        *a = toggled(a, milestone_id)?;
        Ok(())
      })
      .await?;
    info!(target: "mastery", %assignment_id, %milestone_id, progress = updated.overall_progress, "Milestone toggled");
    Ok(updated)
  }

  /// Record a summative assessment outcome on the assignment.
  #[instrument(level = "info", skip(self, result), fields(%assignment_id, score = result.overall_score))]
  pub async fn append_validation(&self, assignment_id: &str, result: ValidationResult) -> Result<Arc<Assignment>> {
    self
      .update(assignment_id, |a| {
        a.validation_history.push(result);
        Ok(())
      })
      .await
  }
}

/// Pure toggle: returns a new assignment with the milestone flipped and progress recomputed.
pub fn toggled(assignment: &Assignment, milestone_id: &str) -> Result<Assignment> {
  let mut next = assignment.clone();
  let milestone = next
    .milestone_mut(milestone_id)
    .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} not in assignment {}", assignment.id)))?;
  milestone.status = milestone.status.toggled();
  next.overall_progress = progress_percent(next.completed_count(), next.milestones.len())
    .ok_or_else(|| CoreError::InvalidState(format!("assignment {} has no milestones", assignment.id)))?;
  Ok(next)
}
