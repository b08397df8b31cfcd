//! Tool-call handling.
//!
//! [`PendingCalls`] turns the per-channel message stream into complete
//! [`FunctionCall`]s (single-shot calls, or argument chunks terminated by a
//! done event). [`ToolDispatcher`] executes them and produces the reply
//! events: one `function_call_output` item followed by `response.create`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use super::base::{QuestionTool, RealtimeError, RealtimeResult};
use super::messages::{ChannelMessage, ClientEvent};
use crate::core::questions::{QuestionBank, QuestionCategory, QuestionRecord};
use crate::core::session::{InterviewMode, QUESTION_TOOL_NAME};

/// A complete function call from the remote model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

#[derive(Debug, Default)]
struct PendingArgs {
    name: Option<String>,
    chunks: String,
}

/// Per-channel buffer of in-flight calls.
///
/// Function names are announced by `response.output_item.added`, arguments
/// arrive as deltas, and only the done event completes a call. Whatever is
/// still tracked when the response ends is discarded.
#[derive(Debug, Default)]
pub struct PendingCalls {
    names: HashMap<String, String>,
    args: HashMap<String, PendingArgs>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls still waiting for their done event.
    pub fn in_flight(&self) -> usize {
        self.args.len()
    }

    /// Number of announced call names not yet consumed.
    pub fn tracked_names(&self) -> usize {
        self.names.len()
    }

    /// Feed one message; returns a call once it is complete.
    pub fn observe(&mut self, message: ChannelMessage) -> Option<FunctionCall> {
        match message {
            ChannelMessage::FunctionCall {
                name,
                call_id,
                arguments,
            } => {
                let tracked = self.names.remove(&call_id);
                Some(FunctionCall {
                    name: name.or(tracked).unwrap_or_default(),
                    call_id,
                    arguments,
                })
            }

            ChannelMessage::ArgumentsDelta {
                call_id,
                name,
                delta,
            } => {
                let entry = self.args.entry(call_id).or_default();
                entry.chunks.push_str(&delta);
                if name.is_some() {
                    entry.name = name;
                }
                None
            }

            ChannelMessage::ArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                let entry = self.args.remove(&call_id).unwrap_or_default();
                let tracked = self.names.remove(&call_id);
                let name = entry.name.or(name).or(tracked).unwrap_or_else(|| {
                    tracing::warn!("Function name not found for call_id: {}", call_id);
                    String::new()
                });
                let arguments = arguments
                    .filter(|a| !a.is_empty())
                    .unwrap_or(entry.chunks);
                tracing::debug!("Function call complete: name={}, call_id={}", name, call_id);
                Some(FunctionCall {
                    name,
                    call_id,
                    arguments,
                })
            }

            ChannelMessage::OutputItemAdded { item } => {
                if item.item_type == "function_call"
                    && let (Some(call_id), Some(name)) = (item.call_id, item.name)
                {
                    tracing::debug!("Tracking function call: call_id={}, name={}", call_id, name);
                    self.names.insert(call_id, name);
                }
                None
            }

            ChannelMessage::ResponseDone => {
                let abandoned = self.names.len().max(self.args.len());
                if abandoned > 0 {
                    tracing::debug!("Response ended with {} incomplete call(s)", abandoned);
                }
                self.names.clear();
                self.args.clear();
                None
            }

            ChannelMessage::Other => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct QuestionArgs {
    #[serde(default)]
    qtype: Option<String>,
}

/// Resolves and executes tool calls.
pub struct ToolDispatcher {
    questions: Arc<dyn QuestionTool>,
    default_category: QuestionCategory,
}

impl ToolDispatcher {
    /// Create a dispatcher; calls without a `qtype` use the mode's category.
    pub fn new(questions: Arc<dyn QuestionTool>, mode: InterviewMode) -> Self {
        Self {
            questions,
            default_category: QuestionCategory::for_mode(mode),
        }
    }

    /// Execute a call and build the reply events.
    ///
    /// Never fails: unknown tools and tool errors become `{"error": ...}`
    /// outputs so the model can recover.
    pub async fn execute(&self, call: &FunctionCall) -> Vec<ClientEvent> {
        let output = match self.run(call).await {
            Ok(value) => value,
            Err(message) => json!({ "error": message }),
        };
        vec![
            ClientEvent::function_output(&call.call_id, output.to_string()),
            ClientEvent::ResponseCreate,
        ]
    }

    async fn run(&self, call: &FunctionCall) -> Result<Value, String> {
        if call.name != QUESTION_TOOL_NAME {
            tracing::warn!("Unknown tool requested: {:?}", call.name);
            return Err(format!("Unknown tool: {}", call.name));
        }

        let args: QuestionArgs = if call.arguments.trim().is_empty() {
            QuestionArgs::default()
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| e.to_string())?
        };

        let category = match args.qtype.as_deref().map(str::trim) {
            None | Some("") => self.default_category,
            Some(raw) => QuestionCategory::parse(raw)
                .ok_or_else(|| "qtype must be 'personal-fit' or 'behavioral'".to_string())?,
        };

        let record = self
            .questions
            .get_question(category)
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!("Question tool served {} ({})", record.id, record.category);
        serde_json::to_value(record).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl QuestionTool for QuestionBank {
    async fn get_question(&self, category: QuestionCategory) -> RealtimeResult<QuestionRecord> {
        self.get(category)
            .await
            .map_err(|e| RealtimeError::ProviderError(e.to_string()))
    }
}
