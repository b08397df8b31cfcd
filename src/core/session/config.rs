//! Interview session parameters.
//!
//! This module contains the value types the broker normalises incoming
//! requests into:
//! - Interview mode selection
//! - Spoken language selection
//! - Upstream defaults (model, voice, turn detection)

use serde::{Deserialize, Serialize};

/// Default upstream realtime model.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-mini-realtime-preview";

/// Default interviewer voice.
pub const DEFAULT_REALTIME_VOICE: &str = "ash";

/// Name of the question tool exposed to the remote model.
pub const QUESTION_TOOL_NAME: &str = "question_bank_get";

// =============================================================================
// Turn detection
// =============================================================================

/// Server VAD activation threshold.
pub const VAD_THRESHOLD: f32 = 0.40;

/// Silence before the provider closes the user's turn (ms).
pub const VAD_SILENCE_DURATION_MS: u32 = 220;

/// Audio kept before detected speech (ms).
pub const VAD_PREFIX_PADDING_MS: u32 = 160;

// =============================================================================
// Modes
// =============================================================================

/// Interview scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterviewMode {
    /// Motivation, fit and values questions only
    PersonalFit,
    /// Past-behaviour questions only
    Behavioral,
    /// Lightweight case-style prompts
    Case,
    /// A balanced mix of the above
    #[default]
    Full,
}

impl InterviewMode {
    /// All modes in the order they are presented to the model.
    pub const ALL: [InterviewMode; 4] = [
        InterviewMode::PersonalFit,
        InterviewMode::Behavioral,
        InterviewMode::Case,
        InterviewMode::Full,
    ];

    /// Convert to the wire value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonalFit => "personal-fit",
            Self::Behavioral => "behavioral",
            Self::Case => "case",
            Self::Full => "full",
        }
    }

    /// Parse a wire value, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "personal-fit" => Some(Self::PersonalFit),
            "behavioral" => Some(Self::Behavioral),
            "case" => Some(Self::Case),
            "full" => Some(Self::Full),
            _ => None,
        }
    }

    /// Parse from an optional query value, falling back to `full`.
    ///
    /// Never fails: anything unrecognised silently becomes the default.
    pub fn normalize(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or_default()
    }

    /// Whether questions for this mode come from the question tool.
    ///
    /// The pool has no case prompts, so case mode is the one exception.
    pub fn uses_question_tool(&self) -> bool {
        !matches!(self, Self::Case)
    }
}

impl std::fmt::Display for InterviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Languages
// =============================================================================

/// Spoken interview language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewLanguage {
    /// English (default)
    #[default]
    En,
    /// German
    De,
}

impl InterviewLanguage {
    /// Convert to the wire value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::De => "de",
        }
    }

    /// Parse a wire value, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" => Some(Self::En),
            "de" => Some(Self::De),
            _ => None,
        }
    }

    /// Parse from an optional query value, falling back to `en`.
    pub fn normalize(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or_default()
    }

    /// Language name as used in spoken-language directives.
    pub fn spoken_name(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::De => "German",
        }
    }
}

impl std::fmt::Display for InterviewLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
