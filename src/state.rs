use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::questions::QuestionBank;
use crate::core::session::CredentialBroker;
use crate::errors::{AppError, AppResult};

/// Shared application state.
///
/// Built once at startup and handed to every handler as `Arc<AppState>`.
/// The question pool is loaded lazily on first use.
pub struct AppState {
    pub config: ServerConfig,
    pub broker: CredentialBroker,
    pub questions: QuestionBank,
}

impl AppState {
    pub fn new(config: ServerConfig) -> AppResult<Arc<Self>> {
        let questions = QuestionBank::from_path(config.question_bank_path.clone());
        Self::with_questions(config, questions)
    }

    /// Build state around an existing question pool.
    pub fn with_questions(config: ServerConfig, questions: QuestionBank) -> AppResult<Arc<Self>> {
        let broker = CredentialBroker::new(&config).map_err(AppError::from)?;
        if config.openai_api_key().is_err() {
            tracing::warn!("OPENAI_API_KEY not set; /session will fail until it is configured");
        }
        tracing::info!(
            "Question pool: {} (loaded on first request)",
            config.question_bank_path.display()
        );
        Ok(Arc::new(Self {
            config,
            broker,
            questions,
        }))
    }
}
