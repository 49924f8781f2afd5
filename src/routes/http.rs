//! HTTP endpoint handlers. These are thin wrappers that forward to the core components.
//! Each handler is instrumented; logs include ids and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::debate::DebateView;
use crate::domain::{Assignment, ValidationResult};
use crate::error::CoreError;
use crate::gate::is_open_in;
use crate::protocol::*;
use crate::roadmap::AssignmentDraft;
use crate::scaffolding::freeze_detected;
use crate::state::AppState;

/// `CoreError` rendered as `{ "error": kind, "message": text }` with a matching status.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    ApiError(e)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      CoreError::NotFound(_) => StatusCode::NOT_FOUND,
      CoreError::InvalidState(_) | CoreError::SessionConcluded(_) => StatusCode::CONFLICT,
      CoreError::GateClosed(_) => StatusCode::FORBIDDEN,
      CoreError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
    };
    warn!(target: "mastery_backend", %status, kind = self.0.kind(), error = %self.0, "Request failed");
    (status, Json(ErrorOut { error: self.0.kind(), message: self.0.to_string() })).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn assignment_out(state: &AppState, assignment: &Assignment) -> AssignmentOut {
  AssignmentOut {
    academic_freeze: freeze_detected(assignment, chrono::Utc::now(), state.config.engine.freeze_window()),
    assignment: assignment.clone(),
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, draft))]
pub async fn http_create_assignment(
  State(state): State<Arc<AppState>>,
  Json(draft): Json<AssignmentDraft>,
) -> ApiResult<AssignmentOut> {
  let assignment = state.roadmap.plan(draft).await?;
  info!(target: "mastery", id = %assignment.id, milestones = assignment.milestones.len(), "HTTP assignment created");
  Ok(Json(assignment_out(&state, &assignment)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<AssignmentOut>> {
  let all = state.store.list().await;
  Json(all.iter().map(|a| assignment_out(&state, a)).collect())
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_assignment(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<AssignmentOut> {
  let assignment = state.store.get(&id).await?;
  Ok(Json(assignment_out(&state, &assignment)))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_assignment(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  state.store.remove(&id).await?;
  state.scaffolding.stop(&id).await;
  let debates = state.debates.discard_for_assignment(&id).await;
  info!(target: "mastery", %id, debates, "HTTP assignment deleted");
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state), fields(%id, %milestone_id))]
pub async fn http_toggle_milestone(
  State(state): State<Arc<AppState>>,
  Path((id, milestone_id)): Path<(String, String)>,
) -> ApiResult<AssignmentOut> {
  let assignment = state.store.toggle(&id, &milestone_id).await?;
  Ok(Json(assignment_out(&state, &assignment)))
}

#[instrument(level = "info", skip(state), fields(%id, %milestone_id))]
pub async fn http_ensure_course(
  State(state): State<Arc<AppState>>,
  Path((id, milestone_id)): Path<(String, String)>,
) -> ApiResult<MiniCourseOut> {
  let mini_course = state.courses.ensure(&id, &milestone_id).await?;
  let gate_open = mini_course.formative_task_completed;
  Ok(Json(MiniCourseOut { mini_course, gate_open }))
}

#[instrument(level = "info", skip(state), fields(%id, %milestone_id))]
pub async fn http_complete_formative(
  State(state): State<Arc<AppState>>,
  Path((id, milestone_id)): Path<(String, String)>,
) -> ApiResult<MiniCourseOut> {
  let assignment = state.gate.complete(&id, &milestone_id).await?;
  let gate_open = is_open_in(&assignment, &milestone_id)?;
  let mini_course = assignment
    .milestone(&milestone_id)
    .and_then(|m| m.mini_course.clone())
    .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} has no mini-course")))?;
  Ok(Json(MiniCourseOut { mini_course, gate_open }))
}

#[instrument(level = "info", skip(state), fields(%id, %milestone_id))]
pub async fn http_start_debate(
  State(state): State<Arc<AppState>>,
  Path((id, milestone_id)): Path<(String, String)>,
) -> ApiResult<DebateView> {
  let view = state.debates.start(&id, &milestone_id).await?;
  info!(target: "debate", session_id = %view.session_id, "HTTP debate started");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_get_debate(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> ApiResult<DebateView> {
  Ok(Json(state.debates.view(&session_id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%session_id, text_len = body.text.len()))]
pub async fn http_submit_turn(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
  Json(body): Json<TurnIn>,
) -> ApiResult<DebateView> {
  let view = state.debates.submit(&session_id, &body.text).await?;
  info!(target: "debate", %session_id, tension = view.running_tension, can_finalize = view.can_finalize, "HTTP debate turn");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_finalize_debate(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> ApiResult<FinalizeOut> {
  let outcome = state.debates.finalize(&session_id).await?;
  Ok(Json(FinalizeOut {
    mastery_status: outcome.mastery_status,
    final_tension: outcome.final_tension,
    assignment: Assignment::clone(&outcome.assignment),
  }))
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn http_discard_debate(
  State(state): State<Arc<AppState>>,
  Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
  state.debates.discard(&session_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_generate_scaffolding(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<ScaffoldingOut> {
  let task = state.scaffolding.generate(&id).await?;
  Ok(Json(ScaffoldingOut { task }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_start_scaffolding(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<CountdownOut> {
  let rx = state.scaffolding.start(&id).await?;
  let remaining_seconds = *rx.borrow();
  Ok(Json(CountdownOut { remaining_seconds }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_countdown(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<CountdownOut> {
  let remaining_seconds = state
    .scaffolding
    .remaining(&id)
    .await
    .ok_or_else(|| CoreError::NotFound(format!("countdown for assignment {id}")))?;
  Ok(Json(CountdownOut { remaining_seconds }))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_complete_scaffolding(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<AssignmentOut> {
  let assignment = state.scaffolding.complete(&id).await?;
  Ok(Json(assignment_out(&state, &assignment)))
}

#[instrument(level = "info", skip(state, result), fields(%id))]
pub async fn http_append_validation(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(result): Json<ValidationResult>,
) -> ApiResult<AssignmentOut> {
  let assignment = state.store.append_validation(&id, result).await?;
  Ok(Json(assignment_out(&state, &assignment)))
}
