use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::core::questions::QuestionError;
use crate::core::session::BrokerError;

/// Errors surfaced by HTTP handlers.
///
/// Every variant renders as `{"error": "<message>"}`. Only validation
/// failures map to 400; everything else is a 500, which is what browser
/// clients of the relay expect.
#[derive(Debug, Error)]
pub enum AppError {
    /// Server-side configuration is missing or unusable (e.g. no API key)
    #[error("{0}")]
    Configuration(String),

    /// The upstream provider failed or returned something unusable
    #[error("{0}")]
    Upstream(String),

    /// The request itself is invalid
    #[error("{0}")]
    Validation(String),

    /// The question pool holds no records at all
    #[error("Question bank is empty")]
    EmptyPool,

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_)
            | AppError::Upstream(_)
            | AppError::EmptyPool
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::Validation(msg) => tracing::debug!("Rejected request: {}", msg),
            other => tracing::error!("Request failed: {}", other),
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::MissingApiKey => AppError::Configuration(err.to_string()),
            BrokerError::Upstream { message, .. } => AppError::Upstream(message),
            BrokerError::Transport(msg) | BrokerError::InvalidResponse(msg) => {
                AppError::Upstream(msg)
            }
        }
    }
}

impl From<QuestionError> for AppError {
    fn from(err: QuestionError) -> Self {
        match err {
            QuestionError::EmptyPool => AppError::EmptyPool,
            QuestionError::Load(_) | QuestionError::Parse(_) => AppError::Internal(err.to_string()),
        }
    }
}
