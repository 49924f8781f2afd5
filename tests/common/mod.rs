#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use mastery_backend::config::MasteryConfig;
use mastery_backend::debate::{FixedStepScoring, ScoringStrategy};
use mastery_backend::domain::{Assignment, Milestone, MilestoneStatus};
use mastery_backend::generator::{ContentGenerator, GenerationPrompt, ResultSchema};
use mastery_backend::seeds::OfflineGenerator;
use mastery_backend::store::LogSink;
use mastery_backend::{AppState, CoreError, Result};

/// Offline content with call counting, optional latency and one-shot failures.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_next: Mutex<HashSet<&'static str>>,
    delay: Duration,
}

impl ScriptedGenerator {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    pub fn calls(&self, schema: &str) -> usize {
        self.calls.lock().unwrap().get(schema).copied().unwrap_or(0)
    }

    pub fn fail_next(&self, schema: &'static str) {
        self.fail_next.lock().unwrap().insert(schema);
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &GenerationPrompt, schema: &ResultSchema) -> Result<Value> {
        *self.calls.lock().unwrap().entry(schema.name).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_next.lock().unwrap().remove(schema.name) {
            return Err(CoreError::GenerationFailed("scripted failure".into()));
        }
        OfflineGenerator.generate(prompt, schema).await
    }
}

pub fn app(generator: Arc<ScriptedGenerator>, scoring: Arc<dyn ScoringStrategy>) -> AppState {
    AppState::with_parts(MasteryConfig::default(), generator, scoring, Arc::new(LogSink))
}

pub fn app_with_step(generator: Arc<ScriptedGenerator>, step: f32) -> AppState {
    app(generator, Arc::new(FixedStepScoring(step)))
}

/// `n` TODO milestones `m0..m{n-1}`, deadline `hours_left` from now.
pub fn assignment(id: &str, n: usize, hours_left: i64) -> Assignment {
    let deadline = Utc::now() + chrono::Duration::hours(hours_left);
    Assignment {
        id: id.into(),
        title: "Comparative essay".into(),
        description: "Compare two theories of learning".into(),
        learning_outcome: "Evaluate competing theories".into(),
        deadline,
        milestones: (0..n)
            .map(|i| Milestone {
                id: format!("m{i}"),
                title: format!("Step {i}"),
                description: format!("Do step {i}"),
                estimated_minutes: 45,
                deadline,
                status: MilestoneStatus::Todo,
                mini_course: None,
            })
            .collect(),
        overall_progress: 0,
        at_risk: false,
        current_scaffolding_task: None,
        validation_history: vec![],
    }
}

/// Store an assignment, generate the course for `m0` and open its gate.
pub async fn gated_assignment(state: &AppState, id: &str) {
    state.store.insert(assignment(id, 3, 24 * 10)).await.unwrap();
    state.courses.ensure(id, "m0").await.unwrap();
    state.gate.complete(id, "m0").await.unwrap();
}
