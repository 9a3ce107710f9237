use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/meetings/record/start", post(handlers::start_recording))
        .route(
            "/meetings/record/stop/:meeting_id",
            post(handlers::stop_recording),
        )
        .route("/meetings/:meeting_id/pause", post(handlers::pause_recording))
        .route(
            "/meetings/:meeting_id/resume",
            post(handlers::resume_recording),
        )
        .route("/meetings/:meeting_id", delete(handlers::discard_recording))
        // Meeting queries
        .route(
            "/meetings/:meeting_id/status",
            get(handlers::get_meeting_status),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
