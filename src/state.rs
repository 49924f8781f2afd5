//! Application state: the assignment store and the components that operate on it.
//!
//! This module owns:
//!   - the assignment store (copy-on-write snapshots + persistence sink)
//!   - roadmap planner, mini-course cache, formative gate, debate engine, scaffolding
//!   - the content generator (OpenAI if configured, offline fallback otherwise)
//!
//! Every component shares the same store handle, so each mutation path goes through
//! the store's copy-on-write update.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_mastery_config_from_env, MasteryConfig};
use crate::debate::{DebateEngine, DriftScoring, ScoringStrategy};
use crate::gate::FormativeGate;
use crate::generator::ContentGenerator;
use crate::minicourse::MiniCourseCache;
use crate::openai::OpenAI;
use crate::roadmap::RoadmapPlanner;
use crate::scaffolding::ScaffoldingIntervention;
use crate::seeds::OfflineGenerator;
use crate::store::{AssignmentSink, AssignmentStore, LogSink};

#[derive(Clone)]
pub struct AppState {
    pub store: AssignmentStore,
    pub roadmap: RoadmapPlanner,
    pub courses: MiniCourseCache,
    pub gate: FormativeGate,
    pub debates: DebateEngine,
    pub scaffolding: ScaffoldingIntervention,
    pub config: Arc<MasteryConfig>,
}

impl AppState {
    /// Build state from env: load config, pick the generator, wire components.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        // Load TOML config if provided (prompts + engine tuning).
        let config = load_mastery_config_from_env().unwrap_or_default();

        let generator: Arc<dyn ContentGenerator> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "mastery_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Arc::new(oa)
            }
            None => {
                info!(target: "mastery_backend", "OpenAI disabled (no OPENAI_API_KEY). Using offline content.");
                Arc::new(OfflineGenerator)
            }
        };

        Self::with_parts(config, generator, Arc::new(DriftScoring::default()), Arc::new(LogSink))
    }

    /// Explicit wiring, used by `new` and by tests with scripted collaborators.
    pub fn with_parts(
        config: MasteryConfig,
        generator: Arc<dyn ContentGenerator>,
        scoring: Arc<dyn ScoringStrategy>,
        sink: Arc<dyn AssignmentSink>,
    ) -> Self {
        let config = Arc::new(config);
        let prompts = Arc::new(config.prompts.clone());
        let engine = &config.engine;
        let timeout = engine.generation_timeout();

        let store = AssignmentStore::new(sink, engine.freeze_window());
        let roadmap = RoadmapPlanner::new(store.clone(), generator.clone(), prompts.clone(), timeout);
        let courses = MiniCourseCache::new(store.clone(), generator.clone(), prompts.clone(), timeout);
        let gate = FormativeGate::new(store.clone());
        let debates = DebateEngine::new(store.clone(), generator.clone(), prompts.clone(), scoring, engine);
        let scaffolding = ScaffoldingIntervention::new(store.clone(), generator, prompts, engine);

        info!(
            target: "mastery_backend",
            timeout_secs = engine.generation_timeout_secs,
            can_finalize = engine.can_finalize_threshold,
            freeze_window_hours = engine.freeze_window_hours,
            "Mastery engine configured"
        );

        Self { store, roadmap, courses, gate, debates, scaffolding, config }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
