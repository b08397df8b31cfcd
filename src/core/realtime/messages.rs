//! Control-channel message types.
//!
//! Outbound events are a small subset of the provider's client events.
//! Inbound frames are parsed into [`ChannelMessage`], a closed set of the
//! kinds the client acts on; everything else is `Other`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Client Events (sent to provider)
// =============================================================================

/// Events the client sends over the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Ask the model to respond
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// A user text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "user".to_string(),
                content: vec![ContentPart::InputText { text: text.into() }],
            },
        }
    }

    /// The result of a function call. `output` must already be a JSON string.
    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }
}

/// Conversation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    /// Message item
    #[serde(rename = "message")]
    Message {
        /// Role (user, assistant, system)
        role: String,
        /// Content parts
        content: Vec<ContentPart>,
    },

    /// Function call output
    #[serde(rename = "function_call_output")]
    FunctionCallOutput {
        /// Call ID the output answers
        call_id: String,
        /// Output, JSON-encoded
        output: String,
    },
}

/// Content part of a message item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Input text
    #[serde(rename = "input_text")]
    InputText {
        /// Text content
        text: String,
    },
}

// =============================================================================
// Channel Messages (received from provider)
// =============================================================================

/// Inbound control-channel frame, reduced to what the client acts on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    /// Complete function call in one frame
    #[serde(rename = "response.function_call", alias = "response.tool_call")]
    FunctionCall {
        #[serde(default)]
        name: Option<String>,
        call_id: String,
        #[serde(default, alias = "arguments_json")]
        arguments: String,
    },

    /// Streamed argument chunk
    #[serde(
        rename = "response.function_call_arguments.delta",
        alias = "response.function_call.arguments.delta"
    )]
    ArgumentsDelta {
        call_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        delta: String,
    },

    /// End of streamed arguments
    #[serde(
        rename = "response.function_call_arguments.done",
        alias = "response.function_call.arguments.done"
    )]
    ArgumentsDone {
        call_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Option<String>,
    },

    /// Output item added; carries the function name for later argument events
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// The added item
        item: OutputItem,
    },

    /// End of a model response; calls not completed by now never will be
    #[serde(rename = "response.done")]
    ResponseDone,

    /// Anything else
    #[serde(other)]
    Other,
}

/// Output item as announced by `response.output_item.added`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputItem {
    /// Item type
    #[serde(rename = "type", default)]
    pub item_type: String,
    /// Call ID (function calls only)
    #[serde(default)]
    pub call_id: Option<String>,
    /// Function name (function calls only)
    #[serde(default)]
    pub name: Option<String>,
}

impl ChannelMessage {
    /// Parse one text frame.
    ///
    /// Fails only on non-JSON input. A frame of a known type that lacks
    /// required fields degrades to `Other` rather than failing.
    pub fn parse(text: &str) -> Result<(ChannelMessage, Option<String>), serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        let message = serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::debug!("Unusable {:?} frame: {}", kind, e);
            ChannelMessage::Other
        });
        Ok((message, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_function_output_wire_shape() {
        let event = ClientEvent::function_output("call_1", r#"{"id":"pf-1"}"#);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "function_call_output",
                    "call_id": "call_1",
                    "output": "{\"id\":\"pf-1\"}"
                }
            })
        );
    }

    #[test]
    fn test_response_create_wire_shape() {
        let json = serde_json::to_value(ClientEvent::ResponseCreate).unwrap();
        assert_eq!(json, json!({ "type": "response.create" }));
    }

    #[test]
    fn test_user_text_wire_shape() {
        let json = serde_json::to_value(ClientEvent::user_text("Hi")).unwrap();
        assert_eq!(json["item"]["type"], "message");
        assert_eq!(json["item"]["role"], "user");
        assert_eq!(json["item"]["content"][0]["type"], "input_text");
        assert_eq!(json["item"]["content"][0]["text"], "Hi");
    }

    #[test]
    fn test_parse_single_shot_call_both_spellings() {
        let (msg, _) = ChannelMessage::parse(
            r#"{"type":"response.function_call","name":"question_bank_get","call_id":"c1","arguments_json":"{}"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ChannelMessage::FunctionCall {
                name: Some("question_bank_get".into()),
                call_id: "c1".into(),
                arguments: "{}".into(),
            }
        );

        let (msg, _) =
            ChannelMessage::parse(r#"{"type":"response.tool_call","call_id":"c2"}"#).unwrap();
        assert!(matches!(msg, ChannelMessage::FunctionCall { call_id, .. } if call_id == "c2"));
    }

    #[test]
    fn test_parse_argument_stream_both_spellings() {
        let (delta, _) = ChannelMessage::parse(
            r#"{"type":"response.function_call.arguments.delta","call_id":"c1","delta":"{\"qt"}"#,
        )
        .unwrap();
        assert!(matches!(delta, ChannelMessage::ArgumentsDelta { ref delta, .. } if delta == "{\"qt"));

        let (done, _) = ChannelMessage::parse(
            r#"{"type":"response.function_call_arguments.done","call_id":"c1","arguments":"{}","item_id":"i","output_index":0,"response_id":"r"}"#,
        )
        .unwrap();
        assert!(matches!(
            done,
            ChannelMessage::ArgumentsDone { arguments: Some(ref a), .. } if a == "{}"
        ));
    }

    #[test]
    fn test_parse_output_item_added() {
        let (msg, _) = ChannelMessage::parse(
            r#"{"type":"response.output_item.added","response_id":"r","output_index":0,"item":{"id":"i","type":"function_call","call_id":"c1","name":"question_bank_get"}}"#,
        )
        .unwrap();
        match msg {
            ChannelMessage::OutputItemAdded { item } => {
                assert_eq!(item.item_type, "function_call");
                assert_eq!(item.name.as_deref(), Some("question_bank_get"));
            }
            other => panic!("Expected OutputItemAdded, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_other_and_degraded() {
        let (msg, kind) =
            ChannelMessage::parse(r#"{"type":"session.created","session":{}}"#).unwrap();
        assert_eq!(msg, ChannelMessage::Other);
        assert_eq!(kind.as_deref(), Some("session.created"));

        // Known type, missing call_id.
        let (msg, _) =
            ChannelMessage::parse(r#"{"type":"response.function_call_arguments.delta"}"#).unwrap();
        assert_eq!(msg, ChannelMessage::Other);

        let (msg, _) = ChannelMessage::parse(
            r#"{"type":"response.done","response":{"id":"resp_1","status":"completed","output":[]}}"#,
        )
        .unwrap();
        assert_eq!(msg, ChannelMessage::ResponseDone);

        let (msg, kind) = ChannelMessage::parse(r#"{"hello":1}"#).unwrap();
        assert_eq!(msg, ChannelMessage::Other);
        assert_eq!(kind, None);

        assert!(ChannelMessage::parse("not json").is_err());
    }
}
