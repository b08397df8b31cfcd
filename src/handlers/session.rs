use axum::extract::{RawQuery, State};
use axum::response::Json;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::AppResult;
use crate::state::AppState;

/// Query parameters of `GET /session`. Both are optional and free-form;
/// unrecognised values fall back to the defaults instead of failing.
#[derive(Debug, Default)]
pub struct SessionQuery {
    pub mode: Option<String>,
    pub language: Option<String>,
}

impl SessionQuery {
    pub fn from_raw(raw: Option<&str>) -> Self {
        let mut values = super::first_query_values(raw);
        Self {
            mode: values.remove("mode"),
            language: values.remove("language"),
        }
    }
}

/// Mint an ephemeral realtime credential.
///
/// Responds with the upstream session body unchanged so clients can read
/// `client_secret` and `expires_at` exactly as the provider sent them.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Value>> {
    let query = SessionQuery::from_raw(raw.as_deref());
    let issued = state
        .broker
        .issue(query.mode.as_deref(), query.language.as_deref())
        .await?;
    Ok(Json(issued.body))
}
