//! Formative gate: a debate on a milestone unlocks once its formative action is done.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::domain::Assignment;
use crate::error::{CoreError, Result};
use crate::minicourse::find_milestone;
use crate::store::AssignmentStore;

#[derive(Clone)]
pub struct FormativeGate {
  store: AssignmentStore,
}

impl FormativeGate {
  pub fn new(store: AssignmentStore) -> Self {
    Self { store }
  }

  /// Mark the formative action done. Monotonic; repeat calls leave the flag set.
  #[instrument(level = "info", skip(self), fields(%assignment_id, %milestone_id))]
  pub async fn complete(&self, assignment_id: &str, milestone_id: &str) -> Result<Arc<Assignment>> {
    let current = self.store.get(assignment_id).await?;
    if is_open_in(&current, milestone_id)? {
      return Ok(current);
    }
    let updated = self
      .store
      .update(assignment_id, |a| {
        let milestone = a
          .milestone_mut(milestone_id)
          .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} not in assignment {assignment_id}")))?;
        let course = milestone.mini_course.as_mut().ok_or_else(|| {
          CoreError::InvalidState(format!("milestone {milestone_id} has no mini-course yet"))
        })?;
        course.formative_task_completed = true;
        Ok(())
      })
      .await?;
    info!(target: "mastery", %assignment_id, %milestone_id, "Formative gate opened");
    Ok(updated)
  }

  pub async fn is_open(&self, assignment_id: &str, milestone_id: &str) -> Result<bool> {
    let assignment = self.store.get(assignment_id).await?;
    is_open_in(&assignment, milestone_id)
  }
}

/// Gate state read off a snapshot. No mini-course means the gate is closed.
pub fn is_open_in(assignment: &Assignment, milestone_id: &str) -> Result<bool> {
  let milestone = find_milestone(assignment, milestone_id)?;
  Ok(milestone
    .mini_course
    .as_ref()
    .map(|c| c.formative_task_completed)
    .unwrap_or(false))
}
