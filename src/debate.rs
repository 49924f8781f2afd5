//! Debate engine: a per-milestone adversarial dialogue that accumulates "intellectual
//! tension" and resolves it into a mastery verdict.
//!
//! Lifecycle per session: `NotStarted → Open → Concluded`.
//!   - `start` requires the formative gate, generates the opening challenge (fixed seed
//!     weight, not part of the running tension) and opens the session.
//!   - `submit` appends the learner turn (weight 0) and the model reply (scored by the
//!     pluggable `ScoringStrategy`, clamped to [0, 100]). Nothing is appended on failure.
//!   - `finalize` resolves the verdict and writes status + transcript to the mini-course.
//!
//! Sessions are in-memory only. Discarding one leaves the milestone untouched. Concluded
//! sessions stay viewable until `CONCLUDED_RETAINED` newer ones push them out.

use std::{
  collections::{HashMap, VecDeque},
  sync::Arc,
  time::Duration,
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, Prompts};
use crate::domain::{Assignment, DebateRole, DebateTurn, MasteryStatus};
use crate::error::{CoreError, Result};
use crate::generator::{generate_as, ContentGenerator, GenerationPrompt, ModelTier, ResultSchema};
use crate::mastery;
use crate::minicourse::find_milestone;
use crate::store::AssignmentStore;
use crate::util::{clamp_weight, fill_template, trunc_for_log};

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// The exchange a strategy scores: the learner's argument and the model's answer to it.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
  pub user_text: &'a str,
  pub model_text: &'a str,
  /// Number of learner turns so far, this one included.
  pub round: usize,
}

/// Maps the current running tension and the latest exchange to the next tension.
/// The engine clamps the result to [0, 100].
pub trait ScoringStrategy: Send + Sync {
  fn next_tension(&self, current: f32, exchange: &Exchange<'_>) -> f32;
}

/// Uniform random drift in `[low, high)` per exchange; the stock heuristic is `[-5, 15)`.
#[derive(Clone, Debug)]
pub struct DriftScoring {
  pub low: f32,
  pub high: f32,
}

impl Default for DriftScoring {
  fn default() -> Self {
    Self { low: -5.0, high: 15.0 }
  }
}

impl ScoringStrategy for DriftScoring {
  fn next_tension(&self, current: f32, _exchange: &Exchange<'_>) -> f32 {
    if self.high <= self.low {
      return current + self.low;
    }
    current + rand::thread_rng().gen_range(self.low..self.high)
  }
}

/// Deterministic increment per exchange.
#[derive(Clone, Debug)]
pub struct FixedStepScoring(pub f32);

impl ScoringStrategy for FixedStepScoring {
  fn next_tension(&self, current: f32, _exchange: &Exchange<'_>) -> f32 {
    current + self.0
  }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebateState {
  NotStarted,
  Open,
  Concluded,
}

#[derive(Debug, Clone)]
struct DebateSession {
  id: String,
  assignment_id: String,
  milestone_id: String,
  milestone_title: String,
  formative_action: String,
  state: DebateState,
  transcript: Vec<DebateTurn>,
  running_tension: f32,
  /// Set while a model reply is being generated. At most one per session.
  reply_pending: bool,
}

impl DebateSession {
  fn open(&mut self, opener: String, opening_weight: f32) {
    self.transcript.push(DebateTurn {
      role: DebateRole::Model,
      text: opener,
      intellectual_weight: clamp_weight(opening_weight),
    });
    self.state = DebateState::Open;
  }

  fn learner_rounds(&self) -> usize {
    self.transcript.iter().filter(|t| t.role == DebateRole::User).count()
  }

  fn ensure_open(&self) -> Result<()> {
    match self.state {
      DebateState::Open => Ok(()),
      DebateState::Concluded => Err(CoreError::SessionConcluded(format!("debate {}", self.id))),
      DebateState::NotStarted => Err(CoreError::InvalidState(format!("debate {} is not open", self.id))),
    }
  }
}

/// What a host UI needs to render a live debate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateView {
  pub session_id: String,
  pub assignment_id: String,
  pub milestone_id: String,
  pub state: DebateState,
  pub transcript: Vec<DebateTurn>,
  pub running_tension: f32,
  pub can_finalize: bool,
  pub reply_pending: bool,
}

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
  pub mastery_status: MasteryStatus,
  pub final_tension: f32,
  pub assignment: Arc<Assignment>,
}

#[derive(Deserialize)]
struct GeneratedTurn {
  text: String,
}

/// A learner turn waiting for its reply, captured while the session lock was held.
struct PendingTurn {
  user_turn: DebateTurn,
  prompt_user: String,
  transcript_len: usize,
  round: usize,
}

/// How many concluded sessions stay viewable before the oldest are evicted.
const CONCLUDED_RETAINED: usize = 256;

struct SessionEntry {
  assignment_id: String,
  session: Arc<Mutex<DebateSession>>,
}

#[derive(Default)]
struct Registry {
  live: HashMap<String, SessionEntry>,
  /// Concluded session ids, oldest first.
  concluded: VecDeque<String>,
}

impl Registry {
  fn conclude(&mut self, session_id: &str) {
    self.concluded.push_back(session_id.to_string());
    while self.concluded.len() > CONCLUDED_RETAINED {
      if let Some(old) = self.concluded.pop_front() {
        self.live.remove(&old);
        debug!(target: "debate", session_id = %old, "Concluded debate evicted");
      }
    }
  }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DebateEngine {
  store: AssignmentStore,
  generator: Arc<dyn ContentGenerator>,
  prompts: Arc<Prompts>,
  scoring: Arc<dyn ScoringStrategy>,
  timeout: Duration,
  can_finalize_threshold: f32,
  opening_weight: f32,
  sessions: Arc<RwLock<Registry>>,
}

impl DebateEngine {
  pub fn new(
    store: AssignmentStore,
    generator: Arc<dyn ContentGenerator>,
    prompts: Arc<Prompts>,
    scoring: Arc<dyn ScoringStrategy>,
    engine: &EngineConfig,
  ) -> Self {
    Self {
      store,
      generator,
      prompts,
      scoring,
      timeout: engine.generation_timeout(),
      can_finalize_threshold: engine.can_finalize_threshold,
      opening_weight: engine.opening_weight,
      sessions: Arc::new(RwLock::new(Registry::default())),
    }
  }

  /// Open a debate on a milestone whose formative action is complete.
  #[instrument(level = "info", skip(self), fields(%assignment_id, %milestone_id))]
  pub async fn start(&self, assignment_id: &str, milestone_id: &str) -> Result<DebateView> {
    let assignment = self.store.get(assignment_id).await?;
    let milestone = find_milestone(&assignment, milestone_id)?;
    let course = match &milestone.mini_course {
      Some(c) if c.formative_task_completed => c,
      _ => {
        return Err(CoreError::GateClosed(format!(
          "formative action for milestone {milestone_id} is not complete"
        )))
      }
    };
    if course.mastery_status.is_terminal() {
      return Err(CoreError::InvalidState(format!(
        "milestone {milestone_id} already has a mastery verdict ({:?})",
        course.mastery_status
      )));
    }

    let mut session = DebateSession {
      id: Uuid::new_v4().to_string(),
      assignment_id: assignment_id.to_string(),
      milestone_id: milestone_id.to_string(),
      milestone_title: milestone.title.clone(),
      formative_action: course.formative_action.clone(),
      state: DebateState::NotStarted,
      transcript: Vec::new(),
      running_tension: 0.0,
      reply_pending: false,
    };

    let concepts = course.concepts.join(", ");
    let user = fill_template(
      &self.prompts.debate_opening_template,
      &[
        ("milestone_title", milestone.title.as_str()),
        ("assignment_title", assignment.title.as_str()),
        ("concepts", concepts.as_str()),
        ("formative_action", course.formative_action.as_str()),
      ],
    );
    let opener = self.model_turn(user).await?;
    session.open(opener, self.opening_weight);

    let view = self.view_of(&session);
    info!(target: "debate", session_id = %session.id, %assignment_id, %milestone_id, "Debate opened");
    let entry = SessionEntry {
      assignment_id: assignment_id.to_string(),
      session: Arc::new(Mutex::new(session)),
    };
    self.sessions.write().await.live.insert(view.session_id.clone(), entry);
    Ok(view)
  }

  /// Append a learner argument and the model's scored reply.
  ///
  /// The session lock is not held while the reply is generated, so `view` and
  /// `can_finalize` stay responsive. The generation runs on its own task and always
  /// clears the pending flag, even if the caller goes away.
  #[instrument(level = "info", skip(self, user_text), fields(%session_id, text_len = user_text.len()))]
  pub async fn submit(&self, session_id: &str, user_text: &str) -> Result<DebateView> {
    let user_text = user_text.trim();
    if user_text.is_empty() {
      return Err(CoreError::InvalidState("debate turn text is empty".into()));
    }
    let session = self.session(session_id).await?;
    let pending = {
      let mut s = session.lock().await;
      s.ensure_open()?;
      if s.reply_pending {
        return Err(CoreError::InvalidState(format!("debate {session_id} already has a reply pending")));
      }
      let user_turn = DebateTurn {
        role: DebateRole::User,
        text: user_text.to_string(),
        intellectual_weight: 0.0,
      };
      let transcript = render_transcript(s.transcript.iter().chain(std::iter::once(&user_turn)));
      let prompt_user = fill_template(
        &self.prompts.debate_continue_template,
        &[
          ("milestone_title", s.milestone_title.as_str()),
          ("formative_action", s.formative_action.as_str()),
          ("transcript", transcript.as_str()),
        ],
      );
      s.reply_pending = true;
      PendingTurn { user_turn, prompt_user, transcript_len: s.transcript.len(), round: s.learner_rounds() + 1 }
    };

    let engine = self.clone();
    let owned = session.clone();
    let handle = tokio::spawn(async move { engine.answer(owned, pending).await });
    match handle.await {
      Ok(result) => result,
      Err(e) => {
        // The task only dies by panic; make sure the session is usable again.
        session.lock().await.reply_pending = false;
        Err(CoreError::GenerationFailed(format!("debate reply task failed: {e}")))
      }
    }
  }

  async fn answer(&self, session: Arc<Mutex<DebateSession>>, pending: PendingTurn) -> Result<DebateView> {
    let reply = self.model_turn(pending.prompt_user).await;

    let mut s = session.lock().await;
    s.reply_pending = false;
    let session_id = s.id.clone();
    let reply = match reply {
      Ok(r) => r,
      Err(e) => {
        warn!(target: "debate", %session_id, error = %e, "Debate reply failed; transcript unchanged");
        return Err(e);
      }
    };
    // Finalized while the reply was in flight: the reply is dropped.
    s.ensure_open()?;
    if s.transcript.len() != pending.transcript_len {
      return Err(CoreError::InvalidState(format!("debate {session_id} changed while a reply was pending")));
    }

    let exchange = Exchange { user_text: &pending.user_turn.text, model_text: &reply, round: pending.round };
    let tension = clamp_weight(self.scoring.next_tension(s.running_tension, &exchange));
    let preview = trunc_for_log(&pending.user_turn.text, 60);
    s.transcript.push(pending.user_turn);
    s.transcript.push(DebateTurn {
      role: DebateRole::Model,
      text: reply,
      intellectual_weight: tension,
    });
    s.running_tension = tension;

    debug!(target: "debate", %session_id, tension, turns = s.transcript.len(), %preview, "Debate turn scored");
    Ok(self.view_of(&s))
  }

  /// Advisory: true once the running tension is above the finalize threshold.
  pub async fn can_finalize(&self, session_id: &str) -> Result<bool> {
    let session = self.session(session_id).await?;
    let session = session.lock().await;
    Ok(session.running_tension > self.can_finalize_threshold)
  }

  /// Conclude the debate and write the verdict and transcript to the mini-course.
  /// Allowed at any tension. A session whose assignment is gone is dropped.
  #[instrument(level = "info", skip(self), fields(%session_id))]
  pub async fn finalize(&self, session_id: &str) -> Result<FinalizeOutcome> {
    let session = self.session(session_id).await?;
    let mut session = session.lock().await;
    session.ensure_open()?;

    let final_tension = session.running_tension;
    let verdict = mastery::resolve(final_tension);
    let transcript = session.transcript.clone();
    let milestone_id = session.milestone_id.clone();
    let updated = self
      .store
      .update(&session.assignment_id, |a| {
        let milestone = a
          .milestone_mut(&milestone_id)
          .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} no longer exists")))?;
        let course = milestone
          .mini_course
          .as_mut()
          .ok_or_else(|| CoreError::InvalidState(format!("milestone {milestone_id} lost its mini-course")))?;
        if course.mastery_status.is_terminal() {
          return Err(CoreError::InvalidState(format!("milestone {milestone_id} already has a mastery verdict")));
        }
        course.mastery_status = verdict;
        course.debate_history = Some(transcript);
        Ok(())
      })
      .await;
    let assignment = match updated {
      Ok(a) => a,
      Err(e @ CoreError::NotFound(_)) => {
        drop(session);
        self.sessions.write().await.live.remove(session_id);
        warn!(target: "debate", %session_id, "Assignment gone; debate session dropped");
        return Err(e);
      }
      Err(e) => return Err(e),
    };
    session.state = DebateState::Concluded;

    info!(target: "debate", %session_id, milestone_id = %session.milestone_id, final_tension, verdict = ?verdict, turns = session.transcript.len(), "Debate concluded");
    drop(session);
    self.sessions.write().await.conclude(session_id);
    Ok(FinalizeOutcome { mastery_status: verdict, final_tension, assignment })
  }

  pub async fn view(&self, session_id: &str) -> Result<DebateView> {
    let session = self.session(session_id).await?;
    let session = session.lock().await;
    Ok(self.view_of(&session))
  }

  /// Drop an in-memory session (its UI surface went away). No persisted effect.
  #[instrument(level = "info", skip(self), fields(%session_id))]
  pub async fn discard(&self, session_id: &str) -> Result<()> {
    self
      .sessions
      .write()
      .await
      .live
      .remove(session_id)
      .map(|_| debug!(target: "debate", %session_id, "Debate session discarded"))
      .ok_or_else(|| CoreError::NotFound(format!("debate {session_id}")))
  }

  /// Drop every session belonging to an assignment. Returns how many were dropped.
  #[instrument(level = "info", skip(self), fields(%assignment_id))]
  pub async fn discard_for_assignment(&self, assignment_id: &str) -> usize {
    let mut registry = self.sessions.write().await;
    let before = registry.live.len();
    registry.live.retain(|_, e| e.assignment_id != assignment_id);
    let dropped = before - registry.live.len();
    if dropped > 0 {
      debug!(target: "debate", %assignment_id, dropped, "Debate sessions discarded with assignment");
    }
    dropped
  }

  async fn session(&self, session_id: &str) -> Result<Arc<Mutex<DebateSession>>> {
    self
      .sessions
      .read()
      .await
      .live
      .get(session_id)
      .map(|e| e.session.clone())
      .ok_or_else(|| CoreError::NotFound(format!("debate {session_id}")))
  }

  async fn model_turn(&self, user: String) -> Result<String> {
    let prompt = GenerationPrompt {
      system: self.prompts.debate_system.clone(),
      user,
      temperature: 0.8,
      tier: ModelTier::Fast,
    };
    let turn: GeneratedTurn =
      generate_as(self.generator.as_ref(), &prompt, &ResultSchema::debate_turn(), self.timeout).await?;
    let text = turn.text.trim().to_string();
    if text.is_empty() {
      return Err(CoreError::GenerationFailed("debate turn text is empty".into()));
    }
    Ok(text)
  }

  fn view_of(&self, session: &DebateSession) -> DebateView {
    DebateView {
      session_id: session.id.clone(),
      assignment_id: session.assignment_id.clone(),
      milestone_id: session.milestone_id.clone(),
      state: session.state,
      transcript: session.transcript.clone(),
      running_tension: session.running_tension,
      can_finalize: session.running_tension > self.can_finalize_threshold,
      reply_pending: session.reply_pending,
    }
  }
}

fn render_transcript<'a>(turns: impl Iterator<Item = &'a DebateTurn>) -> String {
  turns
    .map(|t| match t.role {
      DebateRole::Model => format!("Examiner: {}", t.text),
      DebateRole::User => format!("Learner: {}", t.text),
    })
    .collect::<Vec<_>>()
    .join("\n")
}
