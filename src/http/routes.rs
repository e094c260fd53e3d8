use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Image and text
        .route("/ocr", post(handlers::ocr))
        .route("/answer", post(handlers::answer))
        .route("/process_ocr_question", post(handlers::process_ocr_question))
        .route("/multimodal", post(handlers::multimodal))
        .route("/chat", post(handlers::chat))
        // Speech
        .route("/transcribe/upload", post(handlers::transcribe_upload))
        .route("/transcribe/stream", get(ws::transcribe_stream))
        // Live sessions
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/stop", post(handlers::stop_session));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
