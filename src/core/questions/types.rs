use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::session::InterviewMode;

/// Classification of a pooled interview question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionCategory {
    /// Motivation, fit and values
    PersonalFit,
    /// Past behaviour
    Behavioral,
}

impl QuestionCategory {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalFit => "personal-fit",
            Self::Behavioral => "behavioral",
        }
    }

    /// Parse a wire value, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "personal-fit" => Some(Self::PersonalFit),
            "behavioral" => Some(Self::Behavioral),
            _ => None,
        }
    }

    /// Category the interviewer starts with (and defaults tool calls to)
    /// for a given mode.
    pub fn for_mode(mode: InterviewMode) -> Self {
        match mode {
            InterviewMode::Behavioral => Self::Behavioral,
            _ => Self::PersonalFit,
        }
    }
}

impl std::fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pooled question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub category: QuestionCategory,
    pub question: String,
    #[serde(default)]
    pub guidance: String,
}

#[derive(Debug, Error)]
pub enum QuestionError {
    #[error("Question bank is empty")]
    EmptyPool,

    #[error("Failed to read question bank: {0}")]
    Load(String),

    #[error("Failed to parse question bank: {0}")]
    Parse(String),
}
