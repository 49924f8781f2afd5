//! Mastery verdict from the final debate tension.
//!
//! The perfected bar (85) sits above the finalize hint (75): finalizing early is allowed
//! and yields `Refined`.

use crate::domain::MasteryStatus;

pub const PERFECTED_THRESHOLD: f32 = 85.0;

/// `Perfected` strictly above 85, otherwise `Refined`. Never returns `Untested`.
pub fn resolve(final_tension: f32) -> MasteryStatus {
  if final_tension > PERFECTED_THRESHOLD {
    MasteryStatus::Perfected
  } else {
    MasteryStatus::Refined
  }
}
