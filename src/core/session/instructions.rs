//! Interviewer instruction text.
//!
//! The text is a short directive header that hard-sets language and mode,
//! followed by the static recruiter guidance compiled into the binary.
//! Output depends only on `(mode, language)`.

use super::config::{InterviewLanguage, InterviewMode, QUESTION_TOOL_NAME};

/// Static behavioural guidance appended after the header.
pub const RECRUITER_GUIDANCE: &str = include_str!("recruiter_en.md");

/// Build the directive header for a mode/language pair.
pub fn build_preamble(mode: InterviewMode, language: InterviewLanguage) -> String {
    let mut lines = vec![
        format!("You MUST interview in {}.", language.spoken_name()),
        format!("Interview scope (mode): {}.", mode.as_str()),
        "Respect the mode strictly:".to_string(),
        "- personal-fit → ask only motivation/fit/values questions.".to_string(),
        "- behavioral → ask only behavior (past actions) questions; you MAY suggest light structure."
            .to_string(),
        "- case → ask only lightweight case-style prompts; not a full-length case.".to_string(),
        "- full → mix of the above, brief and balanced.".to_string(),
        "Ask ONE clear question at a time. Do NOT score or decide here.".to_string(),
    ];

    if mode.uses_question_tool() {
        lines.push(format!(
            "All interview questions MUST be sourced via the function tool '{QUESTION_TOOL_NAME}'."
        ));
        lines.push(format!(
            "Call it with qtype=\"personal-fit\" for motivation/fit questions and qtype=\"behavioral\" for behavior questions{}.",
            match mode {
                InterviewMode::PersonalFit => "; in this mode use only qtype=\"personal-fit\"",
                InterviewMode::Behavioral => "; in this mode use only qtype=\"behavioral\"",
                _ => "",
            }
        ));
        lines.push(
            "Do NOT invent or write your own questions; fetch a new one from the tool for every question."
                .to_string(),
        );
        lines.push(format!(
            "Tool questions are in English; ask them in {}.",
            language.spoken_name()
        ));
    } else {
        lines.push(format!(
            "The question pool holds no case prompts: compose short case-style prompts yourself and do not call '{QUESTION_TOOL_NAME}'."
        ));
    }

    lines.join(" ")
}

/// Build the full instruction text for a mode/language pair.
pub fn build_instructions(mode: InterviewMode, language: InterviewLanguage) -> String {
    format!("{}\n\n{}", build_preamble(mode, language), RECRUITER_GUIDANCE)
}
