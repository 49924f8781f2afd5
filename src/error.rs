//! Error taxonomy for the mastery core.
//!
//! Generation failures are local and retryable; gate/state violations are contract
//! errors surfaced to the caller. `CoreError` is `Clone` so one in-flight generation
//! can hand the same outcome to every waiter.

use thiserror::Error;

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
  /// Operation not valid in the current state (bad input, wrong lifecycle stage).
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// Unknown assignment / milestone / debate session.
  #[error("not found: {0}")]
  NotFound(String),

  /// Debate requested before the formative action was completed.
  #[error("gate closed: {0}")]
  GateClosed(String),

  /// The content generator errored, timed out or returned unparsable content.
  #[error("generation failed: {0}")]
  GenerationFailed(String),

  /// The debate session was already finalized.
  #[error("session concluded: {0}")]
  SessionConcluded(String),
}

impl CoreError {
  /// Stable machine-readable kind, used in API error bodies and log fields.
  pub fn kind(&self) -> &'static str {
    match self {
      CoreError::InvalidState(_) => "invalid_state",
      CoreError::NotFound(_) => "not_found",
      CoreError::GateClosed(_) => "gate_closed",
      CoreError::GenerationFailed(_) => "generation_failed",
      CoreError::SessionConcluded(_) => "session_concluded",
    }
  }
}

impl From<serde_json::Error> for CoreError {
  fn from(e: serde_json::Error) -> Self {
    CoreError::GenerationFailed(format!("JSON parse error: {e}"))
  }
}
