mod common;

use std::{sync::Arc, time::Duration};

use common::{app, app_with_step, assignment, gated_assignment, ScriptedGenerator};
use mastery_backend::debate::{DebateState, DriftScoring};
use mastery_backend::domain::{DebateRole, MasteryStatus};
use mastery_backend::generator::DEBATE_TURN;
use mastery_backend::CoreError;

#[tokio::test]
async fn closed_gate_blocks_debate_without_side_effects() {
    let generator = Arc::new(ScriptedGenerator::default());
    let state = app_with_step(generator.clone(), 30.0);
    state.store.insert(assignment("a", 2, 240)).await.unwrap();

    // No mini-course yet.
    assert!(matches!(state.debates.start("a", "m0").await, Err(CoreError::GateClosed(_))));

    // Mini-course present, formative action not done.
    state.courses.ensure("a", "m0").await.unwrap();
    assert!(!state.gate.is_open("a", "m0").await.unwrap());
    assert!(matches!(state.debates.start("a", "m0").await, Err(CoreError::GateClosed(_))));

    assert_eq!(generator.calls(DEBATE_TURN), 0);
    let course = state.store.get("a").await.unwrap().milestones[0].mini_course.clone().unwrap();
    assert!(course.debate_history.is_none());
}

#[tokio::test]
async fn gate_completion_is_idempotent() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 30.0);
    state.store.insert(assignment("a", 2, 240)).await.unwrap();
    assert!(matches!(state.gate.complete("a", "m0").await, Err(CoreError::InvalidState(_))));

    state.courses.ensure("a", "m0").await.unwrap();
    for _ in 0..3 {
        state.gate.complete("a", "m0").await.unwrap();
        assert!(state.gate.is_open("a", "m0").await.unwrap());
    }
    assert!(!state.gate.is_open("a", "m1").await.unwrap());
}

#[tokio::test]
async fn reaching_ninety_and_finalizing_perfects_the_milestone() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 30.0);
    gated_assignment(&state, "a").await;

    let opened = state.debates.start("a", "m0").await.unwrap();
    assert_eq!(opened.state, DebateState::Open);
    assert_eq!(opened.transcript.len(), 1);
    assert_eq!(opened.transcript[0].role, DebateRole::Model);
    assert_eq!(opened.transcript[0].intellectual_weight, 50.0);
    assert_eq!(opened.running_tension, 0.0);
    assert!(!opened.can_finalize);

    let id = opened.session_id.clone();
    let mut view = opened;
    for arg in ["Because of evidence A.", "Counterexample B fails.", "So the thesis holds."] {
        view = state.debates.submit(&id, arg).await.unwrap();
    }
    assert_eq!(view.running_tension, 90.0);
    assert!(view.can_finalize);
    assert!(state.debates.can_finalize(&id).await.unwrap());
    assert_eq!(view.transcript.len(), 7);

    let outcome = state.debates.finalize(&id).await.unwrap();
    assert_eq!(outcome.mastery_status, MasteryStatus::Perfected);
    assert_eq!(outcome.final_tension, 90.0);

    let course = outcome.assignment.milestones[0].mini_course.clone().unwrap();
    assert_eq!(course.mastery_status, MasteryStatus::Perfected);
    assert_eq!(course.debate_history.unwrap().len(), 7);
    // Mastery does not touch completion status.
    assert_eq!(outcome.assignment.overall_progress, 0);
}

#[tokio::test]
async fn concluded_session_rejects_further_turns() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    // Finalize is allowed below the hint threshold and yields refined.
    let outcome = state.debates.finalize(&id).await.unwrap();
    assert_eq!(outcome.mastery_status, MasteryStatus::Refined);

    assert!(matches!(state.debates.submit(&id, "one more").await, Err(CoreError::SessionConcluded(_))));
    assert!(matches!(state.debates.finalize(&id).await, Err(CoreError::SessionConcluded(_))));
    assert_eq!(state.debates.view(&id).await.unwrap().state, DebateState::Concluded);

    // The verdict is assigned once per mini-course.
    assert!(matches!(state.debates.start("a", "m0").await, Err(CoreError::InvalidState(_))));
}

#[tokio::test]
async fn weights_stay_in_bounds_and_user_turns_score_zero() {
    let state = app(Arc::new(ScriptedGenerator::default()), Arc::new(DriftScoring::default()));
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    let mut view = None;
    for i in 0..60 {
        view = Some(state.debates.submit(&id, &format!("argument {i}")).await.unwrap());
    }
    let view = view.unwrap();
    for turn in &view.transcript {
        assert!((0.0..=100.0).contains(&turn.intellectual_weight));
        if turn.role == DebateRole::User {
            assert_eq!(turn.intellectual_weight, 0.0);
        }
    }
    let last_model = view.transcript.iter().rev().find(|t| t.role == DebateRole::Model).unwrap();
    assert_eq!(view.running_tension, last_model.intellectual_weight);
}

#[tokio::test]
async fn saturating_strategy_is_clamped() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 250.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;
    let view = state.debates.submit(&id, "decisive").await.unwrap();
    assert_eq!(view.running_tension, 100.0);
}

#[tokio::test]
async fn failed_reply_keeps_session_open_and_transcript_unchanged() {
    let generator = Arc::new(ScriptedGenerator::default());
    let state = app_with_step(generator.clone(), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    generator.fail_next(DEBATE_TURN);
    let err = state.debates.submit(&id, "my argument").await.unwrap_err();
    assert!(matches!(err, CoreError::GenerationFailed(_)));
    let view = state.debates.view(&id).await.unwrap();
    assert_eq!(view.state, DebateState::Open);
    assert_eq!(view.transcript.len(), 1);

    let retried = state.debates.submit(&id, "my argument").await.unwrap();
    assert_eq!(retried.transcript.len(), 3);
}

#[tokio::test]
async fn blank_turns_are_rejected() {
    let generator = Arc::new(ScriptedGenerator::default());
    let state = app_with_step(generator.clone(), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;
    let before = generator.calls(DEBATE_TURN);

    assert!(matches!(state.debates.submit(&id, "   ").await, Err(CoreError::InvalidState(_))));
    assert_eq!(generator.calls(DEBATE_TURN), before);
}

#[tokio::test]
async fn failed_opener_creates_no_session() {
    let generator = Arc::new(ScriptedGenerator::default());
    let state = app_with_step(generator.clone(), 30.0);
    gated_assignment(&state, "a").await;

    generator.fail_next(DEBATE_TURN);
    assert!(matches!(state.debates.start("a", "m0").await, Err(CoreError::GenerationFailed(_))));
    assert!(state.debates.start("a", "m0").await.is_ok());
}

#[tokio::test]
async fn discarding_a_session_leaves_the_milestone_untouched() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 30.0);
    gated_assignment(&state, "a").await;
    let before = state.store.get("a").await.unwrap();

    let id = state.debates.start("a", "m0").await.unwrap().session_id;
    state.debates.submit(&id, "argument").await.unwrap();
    state.debates.discard(&id).await.unwrap();

    assert!(matches!(state.debates.view(&id).await, Err(CoreError::NotFound(_))));
    assert!(matches!(state.debates.discard(&id).await, Err(CoreError::NotFound(_))));
    let after = state.store.get("a").await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    let course = after.milestones[0].mini_course.clone().unwrap();
    assert_eq!(course.mastery_status, MasteryStatus::Untested);
    assert!(course.debate_history.is_none());
}

#[tokio::test(start_paused = true)]
async fn view_stays_responsive_while_a_reply_is_pending() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(30)));
    let state = app_with_step(generator.clone(), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    let debates = state.debates.clone();
    let sid = id.clone();
    let pending = tokio::spawn(async move { debates.submit(&sid, "my argument").await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let view = tokio::time::timeout(Duration::from_secs(5), state.debates.view(&id))
        .await
        .expect("view waited on the pending reply")
        .unwrap();
    assert!(view.reply_pending);
    assert_eq!(view.transcript.len(), 1);
    let hint = tokio::time::timeout(Duration::from_secs(5), state.debates.can_finalize(&id))
        .await
        .expect("can_finalize waited on the pending reply")
        .unwrap();
    assert!(!hint);

    // One reply at a time per session.
    assert!(matches!(state.debates.submit(&id, "second").await, Err(CoreError::InvalidState(_))));

    let done = pending.await.unwrap().unwrap();
    assert_eq!(done.transcript.len(), 3);
    assert!(!done.reply_pending);
    assert_eq!(done.running_tension, 30.0);
}

#[tokio::test(start_paused = true)]
async fn finalizing_during_a_pending_reply_drops_the_reply() {
    let generator = Arc::new(ScriptedGenerator::with_delay(Duration::from_secs(30)));
    let state = app_with_step(generator.clone(), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    let debates = state.debates.clone();
    let sid = id.clone();
    let pending = tokio::spawn(async move { debates.submit(&sid, "late argument").await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    let outcome = state.debates.finalize(&id).await.unwrap();
    assert_eq!(outcome.mastery_status, MasteryStatus::Refined);
    let history = outcome.assignment.milestones[0].mini_course.clone().unwrap().debate_history.unwrap();
    assert_eq!(history.len(), 1);

    assert!(matches!(pending.await.unwrap(), Err(CoreError::SessionConcluded(_))));
    let view = state.debates.view(&id).await.unwrap();
    assert_eq!(view.state, DebateState::Concluded);
    assert_eq!(view.transcript.len(), 1);
    assert!(!view.reply_pending);
}

#[tokio::test]
async fn failed_reply_clears_the_pending_flag() {
    let generator = Arc::new(ScriptedGenerator::default());
    let state = app_with_step(generator.clone(), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    generator.fail_next(DEBATE_TURN);
    assert!(state.debates.submit(&id, "argument").await.is_err());
    assert!(!state.debates.view(&id).await.unwrap().reply_pending);
    assert!(state.debates.submit(&id, "argument").await.is_ok());
}

#[tokio::test]
async fn sessions_of_a_removed_assignment_are_dropped() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 30.0);
    gated_assignment(&state, "a").await;
    let id = state.debates.start("a", "m0").await.unwrap().session_id;

    state.store.remove("a").await.unwrap();
    assert!(matches!(state.debates.finalize(&id).await, Err(CoreError::NotFound(_))));
    assert!(matches!(state.debates.view(&id).await, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn discarding_by_assignment_leaves_other_assignments_alone() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 30.0);
    gated_assignment(&state, "a").await;
    gated_assignment(&state, "b").await;
    let a1 = state.debates.start("a", "m0").await.unwrap().session_id;
    let a2 = state.debates.start("a", "m0").await.unwrap().session_id;
    let b = state.debates.start("b", "m0").await.unwrap().session_id;

    assert_eq!(state.debates.discard_for_assignment("a").await, 2);
    assert!(matches!(state.debates.view(&a1).await, Err(CoreError::NotFound(_))));
    assert!(matches!(state.debates.view(&a2).await, Err(CoreError::NotFound(_))));
    assert!(state.debates.view(&b).await.is_ok());
    assert_eq!(state.debates.discard_for_assignment("a").await, 0);
}
