use axum::extract::{RawQuery, State};
use axum::response::Json;
use std::sync::Arc;

use crate::core::questions::{QuestionCategory, QuestionRecord};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Default)]
pub struct QuestionQuery {
    pub qtype: Option<String>,
}

impl QuestionQuery {
    pub fn from_raw(raw: Option<&str>) -> Self {
        Self {
            qtype: super::first_query_values(raw).remove("qtype"),
        }
    }
}

/// Return one random question of the requested category.
///
/// `qtype` is matched case-insensitively. A category with no questions is
/// served from the whole pool instead.
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<QuestionRecord>> {
    let query = QuestionQuery::from_raw(raw.as_deref());
    let raw = query.qtype.unwrap_or_default().to_lowercase();
    let category = QuestionCategory::parse(&raw).ok_or_else(|| {
        AppError::Validation("qtype must be 'personal-fit' or 'behavioral'".to_string())
    })?;

    let record = state.questions.get(category).await?;
    tracing::debug!("Serving question {} for qtype={}", record.id, category);
    Ok(Json(record))
}
