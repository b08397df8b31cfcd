//! Upstream session-issuance request types.
//!
//! The relay posts one [`SessionRequest`] per `/session` call to the
//! provider's `realtime/sessions` endpoint. The response is not modelled:
//! its shape varies between tenants and is passed through to the client.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::config::{
    QUESTION_TOOL_NAME, VAD_PREFIX_PADDING_MS, VAD_SILENCE_DURATION_MS, VAD_THRESHOLD,
};

/// Session-issuance request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Realtime model
    pub model: String,
    /// Output voice
    pub voice: String,
    /// Full instruction text
    pub instructions: String,
    /// Turn detection configuration
    pub turn_detection: TurnDetection,
    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    /// Tool definitions
    #[serde(default)]
    pub tools: Vec<ToolDef>,
}

impl SessionRequest {
    /// Build a request with the fixed VAD parameters and the question tool.
    pub fn new(model: impl Into<String>, voice: impl Into<String>, instructions: String) -> Self {
        Self {
            model: model.into(),
            voice: voice.into(),
            instructions,
            turn_detection: TurnDetection::interview_default(),
            tool_choice: Some("auto".to_string()),
            tools: vec![ToolDef::question_bank()],
        }
    }
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        threshold: f32,
        /// Silence duration in ms
        silence_duration_ms: u32,
        /// Audio prefix padding in ms
        prefix_padding_ms: u32,
        /// Whether user speech interrupts model output (barge-in)
        interrupt_response: bool,
    },
}

impl TurnDetection {
    /// Server VAD tuned for a spoken interview, barge-in enabled.
    pub fn interview_default() -> Self {
        TurnDetection::ServerVad {
            threshold: VAD_THRESHOLD,
            silence_duration_ms: VAD_SILENCE_DURATION_MS,
            prefix_padding_ms: VAD_PREFIX_PADDING_MS,
            interrupt_response: true,
        }
    }
}

/// Tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Function parameters JSON schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDef {
    /// The question-pool tool the remote model calls for every question.
    pub fn question_bank() -> Self {
        Self {
            tool_type: "function".to_string(),
            name: QUESTION_TOOL_NAME.to_string(),
            description: Some(
                "Fetch a question from the question pool. The agent translates to the session language."
                    .to_string(),
            ),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "qtype": { "type": "string", "enum": ["personal-fit", "behavioral"] }
                },
                "required": ["qtype"]
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_request_serialization() {
        let body = SessionRequest::new("gpt-realtime", "ash", "Be brief.".to_string());
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-realtime");
        assert_eq!(json["voice"], "ash");
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["turn_detection"]["silence_duration_ms"], 220);
        assert_eq!(json["turn_detection"]["prefix_padding_ms"], 160);
        assert_eq!(json["turn_detection"]["interrupt_response"], true);
        let threshold = json["turn_detection"]["threshold"].as_f64().unwrap();
        assert!((threshold - 0.40).abs() < 1e-6);
    }

    #[test]
    fn test_question_tool_schema() {
        let body = SessionRequest::new("m", "v", String::new());
        let tool = body
            .tools
            .iter()
            .find(|t| t.name == "question_bank_get")
            .expect("question tool present");
        assert_eq!(tool.tool_type, "function");
        let params = tool.parameters.as_ref().unwrap();
        assert_eq!(
            params["properties"]["qtype"]["enum"],
            json!(["personal-fit", "behavioral"])
        );
        assert_eq!(params["required"], json!(["qtype"]));
    }
}
