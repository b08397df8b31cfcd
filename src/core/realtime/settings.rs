//! Interview settings persisted on the client between runs.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::base::{RealtimeError, RealtimeResult};
use crate::core::questions::QuestionCategory;
use crate::core::session::{InterviewLanguage, InterviewMode, QUESTION_TOOL_NAME};

/// Language and mode the user picked.
///
/// The client starts in `personal-fit` rather than the relay's `full`
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterviewSettings {
    pub language: InterviewLanguage,
    pub mode: InterviewMode,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            language: InterviewLanguage::En,
            mode: InterviewMode::PersonalFit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

impl InterviewSettings {
    pub fn new(language: InterviewLanguage, mode: InterviewMode) -> Self {
        Self { language, mode }
    }

    /// Build from raw values; unrecognised ones keep the client defaults.
    pub fn from_raw(language: Option<&str>, mode: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            language: language
                .and_then(InterviewLanguage::parse)
                .unwrap_or(defaults.language),
            mode: mode.and_then(InterviewMode::parse).unwrap_or(defaults.mode),
        }
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> RealtimeResult<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(RealtimeError::InvalidConfiguration(format!(
                    "Failed to read settings {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        let stored: StoredSettings = serde_json::from_str(&raw)?;
        Ok(Self::from_raw(stored.language.as_deref(), stored.mode.as_deref()))
    }

    /// Persist to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> RealtimeResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                RealtimeError::InvalidConfiguration(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            RealtimeError::InvalidConfiguration(format!(
                "Failed to write settings {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::info!(
            "Settings saved: language={}, mode={}",
            self.language,
            self.mode
        );
        Ok(())
    }

    /// Category of the opening question and of tool calls without a `qtype`.
    pub fn opening_category(&self) -> QuestionCategory {
        QuestionCategory::for_mode(self.mode)
    }

    /// The message that starts the interview on the first transport.
    pub fn kickoff_prompt(&self) -> String {
        if self.mode.uses_question_tool() {
            format!(
                "Start the interview now. Please fetch ONE {} question via function '{}' and ask it in {}.",
                self.opening_category(),
                QUESTION_TOOL_NAME,
                self.language.spoken_name()
            )
        } else {
            format!(
                "Start the interview now. Please pose ONE short case-style prompt and ask it in {}.",
                self.language.spoken_name()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = InterviewSettings::default();
        assert_eq!(settings.language, InterviewLanguage::En);
        assert_eq!(settings.mode, InterviewMode::PersonalFit);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = InterviewSettings::load_or_default(dir.path().join("none.json")).unwrap();
        assert_eq!(settings, InterviewSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = InterviewSettings::new(InterviewLanguage::De, InterviewMode::Behavioral);
        settings.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"behavioral\""));
        assert_eq!(InterviewSettings::load_or_default(&path).unwrap(), settings);
    }

    #[test]
    fn test_unknown_stored_values_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"language":"fr","mode":"CASE"}"#).unwrap();
        let settings = InterviewSettings::load_or_default(&path).unwrap();
        assert_eq!(settings.language, InterviewLanguage::En);
        assert_eq!(settings.mode, InterviewMode::Case);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{{").unwrap();
        assert!(matches!(
            InterviewSettings::load_or_default(&path),
            Err(RealtimeError::SerializationError(_))
        ));
    }

    #[test]
    fn test_kickoff_prompt() {
        let prompt =
            InterviewSettings::new(InterviewLanguage::De, InterviewMode::Behavioral).kickoff_prompt();
        assert_eq!(
            prompt,
            "Start the interview now. Please fetch ONE behavioral question via function 'question_bank_get' and ask it in German."
        );

        let prompt = InterviewSettings::new(InterviewLanguage::En, InterviewMode::Full).kickoff_prompt();
        assert!(prompt.contains("ONE personal-fit question"));
        assert!(prompt.ends_with("in English."));

        let prompt = InterviewSettings::new(InterviewLanguage::En, InterviewMode::Case).kickoff_prompt();
        assert!(!prompt.contains("question_bank_get"));
    }
}
