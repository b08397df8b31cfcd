use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, question, session};
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay API router
///
/// # Endpoints
///
/// - `GET /session?mode=&language=` - mint an ephemeral realtime credential
/// - `GET /tool/question?qtype=` - one random pooled question
/// - `GET /health` - liveness
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(session::create_session))
        .route("/tool/question", get(question::get_question))
        .route("/health", get(api::health_check))
        .layer(TraceLayer::new_for_http())
}
