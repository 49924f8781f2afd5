mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{app_with_step, assignment, ScriptedGenerator};
use mastery_backend::routes::build_router;
use mastery_backend::AppState;

fn router(state: AppState) -> Router {
    build_router(Arc::new(state))
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let r = router(app_with_step(Arc::new(ScriptedGenerator::default()), 10.0));
    let (status, body) = call(&r, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
}

#[tokio::test]
async fn create_then_toggle_through_http() {
    let r = router(app_with_step(Arc::new(ScriptedGenerator::default()), 10.0));
    let deadline = (Utc::now() + chrono::Duration::days(14)).to_rfc3339();
    let (status, created) = call(
        &r,
        "POST",
        "/api/v1/assignments",
        Some(json!({
            "title": "Essay on memory",
            "description": "2000 words comparing models of memory",
            "learningOutcome": "Critically compare memory models",
            "deadline": deadline,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["overallProgress"], 0);
    assert_eq!(created["academicFreeze"], false);
    let milestones = created["milestones"].as_array().unwrap();
    assert_eq!(milestones.len(), 4);
    assert!(milestones.iter().all(|m| m["status"] == "TODO"));

    let id = created["id"].as_str().unwrap();
    let mid = milestones[0]["id"].as_str().unwrap();
    let (status, toggled) =
        call(&r, "POST", &format!("/api/v1/assignments/{id}/milestones/{mid}/toggle"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["overallProgress"], 25);
    assert_eq!(toggled["milestones"][0]["status"], "COMPLETED");

    let (_, listed) = call(&r, "GET", "/api/v1/assignments", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn past_deadline_is_a_conflict() {
    let r = router(app_with_step(Arc::new(ScriptedGenerator::default()), 10.0));
    let deadline = (Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    let (status, body) = call(
        &r,
        "POST",
        "/api/v1/assignments",
        Some(json!({ "title": "Late", "description": "", "learningOutcome": "", "deadline": deadline })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn errors_map_to_statuses() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 10.0);
    state.store.insert(assignment("a", 2, 240)).await.unwrap();
    let r = router(state);

    let (status, body) = call(&r, "GET", "/api/v1/assignments/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = call(&r, "POST", "/api/v1/assignments/a/milestones/m0/debate", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "gate_closed");

    let (status, _) = call(&r, "POST", "/api/v1/assignments/a/milestones/zz/toggle", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&r, "GET", "/api/v1/debates/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gated_debate_round_trip() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 45.0);
    state.store.insert(assignment("a", 2, 240)).await.unwrap();
    let r = router(state);

    let (status, course) = call(&r, "POST", "/api/v1/assignments/a/milestones/m0/course", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(course["gateOpen"], false);
    assert_eq!(course["miniCourse"]["masteryStatus"], "untested");

    let (_, opened) = call(&r, "POST", "/api/v1/assignments/a/milestones/m0/formative", None).await;
    assert_eq!(opened["gateOpen"], true);

    let (status, view) = call(&r, "POST", "/api/v1/assignments/a/milestones/m0/debate", None).await;
    assert_eq!(status, StatusCode::OK);
    let sid = view["sessionId"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, _) =
            call(&r, "POST", &format!("/api/v1/debates/{sid}/turns"), Some(json!({ "text": "my reasoning" }))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, view) = call(&r, "GET", &format!("/api/v1/debates/{sid}"), None).await;
    assert_eq!(view["runningTension"], 90.0);
    assert_eq!(view["canFinalize"], true);

    let (status, done) = call(&r, "POST", &format!("/api/v1/debates/{sid}/finalize"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["masteryStatus"], "perfected");
    assert_eq!(done["assignment"]["milestones"][0]["miniCourse"]["debateHistory"].as_array().unwrap().len(), 5);

    let (status, body) =
        call(&r, "POST", &format!("/api/v1/debates/{sid}/turns"), Some(json!({ "text": "late" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "session_concluded");

    let (status, _) = call(&r, "DELETE", &format!("/api/v1/debates/{sid}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn scaffolding_over_http() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 10.0);
    state.store.insert(assignment("a", 3, 30)).await.unwrap();
    let r = router(state);

    let (_, a) = call(&r, "GET", "/api/v1/assignments/a", None).await;
    assert_eq!(a["academicFreeze"], true);

    let (status, _) = call(&r, "GET", "/api/v1/assignments/a/scaffolding", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, issued) = call(&r, "POST", "/api/v1/assignments/a/scaffolding", None).await;
    assert_eq!(status, StatusCode::OK);
    let duration = issued["task"]["durationSeconds"].as_u64().unwrap();

    let (_, started) = call(&r, "POST", "/api/v1/assignments/a/scaffolding/start", None).await;
    assert_eq!(started["remainingSeconds"].as_u64(), Some(duration));

    let (status, done) = call(&r, "POST", "/api/v1/assignments/a/scaffolding/complete", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["academicFreeze"], false);
    assert_eq!(done["currentScaffoldingTask"]["completed"], true);

    let (status, _) = call(&r, "GET", "/api/v1/assignments/a/scaffolding", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_the_assignment() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 10.0);
    state.store.insert(assignment("a", 2, 240)).await.unwrap();
    let r = router(state);

    let (status, _) = call(&r, "DELETE", "/api/v1/assignments/a", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&r, "GET", "/api/v1/assignments/a", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&r, "DELETE", "/api/v1/assignments/a", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_assignment_drops_its_debates() {
    let state = app_with_step(Arc::new(ScriptedGenerator::default()), 10.0);
    common::gated_assignment(&state, "a").await;
    let sid = state.debates.start("a", "m0").await.unwrap().session_id;
    let r = router(state.clone());

    let (status, _) = call(&r, "DELETE", "/api/v1/assignments/a", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&r, "GET", &format!("/api/v1/debates/{sid}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
