//! Provider-neutral chat types used between the agent and chat backends.

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::pin::Pin;

use crate::error::Result;
use crate::models::{ModelMessage, Role};

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id, echoed back with the tool result.
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model (may be malformed).
    pub arguments: String,
}

/// A capability advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: JsonValue,
}

/// How the model may use the advertised tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides whether and when to call a tool.
    #[default]
    Auto,
    /// Tools must not be called; the model has to answer.
    None,
}

/// One message in a chat exchange, including tool traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    /// Role name on the wire.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

impl From<ModelMessage> for ChatMessage {
    fn from(msg: ModelMessage) -> Self {
        match msg.role {
            Role::System => Self::System(msg.content),
            Role::User => Self::User(msg.content),
            Role::Assistant => Self::Assistant {
                content: Some(msg.content),
                tool_calls: Vec::new(),
            },
        }
    }
}

/// A single model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
}

/// Incremental output of a streaming model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// A fully assembled tool call.
    ToolCall(ToolCall),
    /// The model finished this call (provider finish reason, if any).
    Finish(Option<String>),
}

/// Stream of chat events from a backend.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;
