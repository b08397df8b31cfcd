pub mod api;

use axum::Router;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// API routes plus the static client as fallback.
///
/// `/` resolves to `index.html` in the public directory.
pub fn create_app(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.public_dir);
    api::create_api_router()
        .fallback_service(static_files)
        .with_state(state)
}
