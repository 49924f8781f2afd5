//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws` (micro-task countdown stream)
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route(
            "/api/v1/assignments",
            get(http::http_list_assignments).post(http::http_create_assignment),
        )
        .route(
            "/api/v1/assignments/:id",
            get(http::http_get_assignment).delete(http::http_delete_assignment),
        )
        .route(
            "/api/v1/assignments/:id/milestones/:milestone_id/toggle",
            post(http::http_toggle_milestone),
        )
        .route(
            "/api/v1/assignments/:id/milestones/:milestone_id/course",
            post(http::http_ensure_course),
        )
        .route(
            "/api/v1/assignments/:id/milestones/:milestone_id/formative",
            post(http::http_complete_formative),
        )
        .route(
            "/api/v1/assignments/:id/milestones/:milestone_id/debate",
            post(http::http_start_debate),
        )
        .route(
            "/api/v1/assignments/:id/scaffolding",
            get(http::http_get_countdown).post(http::http_generate_scaffolding),
        )
        .route("/api/v1/assignments/:id/scaffolding/start", post(http::http_start_scaffolding))
        .route(
            "/api/v1/assignments/:id/scaffolding/complete",
            post(http::http_complete_scaffolding),
        )
        .route("/api/v1/assignments/:id/validations", post(http::http_append_validation))
        .route(
            "/api/v1/debates/:session_id",
            get(http::http_get_debate).delete(http::http_discard_debate),
        )
        .route("/api/v1/debates/:session_id/turns", post(http::http_submit_turn))
        .route("/api/v1/debates/:session_id/finalize", post(http::http_finalize_debate))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
