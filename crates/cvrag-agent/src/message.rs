//! Conversion of client "UI messages" into text-only model messages.
//!
//! Clients send `{role, parts}` objects where each part is typed
//! (`text`, `reasoning`, `step-start`, tool traffic, ...). Only text parts
//! reach the model. Entries that do not have that shape are dropped without
//! error because clients interleave control entries that are meant to be
//! ignored.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use cvrag_core::{Error, ModelMessage, Result, Role};

/// One part of a client message.
///
/// Kinds this engine does not understand deserialize to [`UiPart::Unknown`]
/// and are ignored, so newer clients keep working.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiPart {
    Text {
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    StepStart,
    ToolCall {
        #[serde(rename = "toolCallId", default)]
        tool_call_id: Option<String>,
        #[serde(rename = "toolName", default)]
        tool_name: Option<String>,
    },
    ToolResult {
        #[serde(rename = "toolCallId", default)]
        tool_call_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl UiPart {
    /// Interpret one raw part. A bare string counts as text; anything that
    /// fails to parse is `Unknown`.
    pub fn parse(raw: &JsonValue) -> Self {
        match raw {
            JsonValue::String(text) => Self::Text { text: text.clone() },
            other => Self::deserialize(other).unwrap_or(Self::Unknown),
        }
    }

    /// Text carried to the model, if this part has any.
    pub fn model_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUiMessage {
    role: Role,
    parts: Vec<JsonValue>,
    #[serde(default)]
    content: Option<JsonValue>,
}

impl RawUiMessage {
    fn text(&self) -> String {
        if self.parts.is_empty() {
            // Legacy clients put the whole message in `content`.
            if let Some(JsonValue::String(content)) = &self.content {
                return content.clone();
            }
        }
        self.parts
            .iter()
            .map(UiPart::parse)
            .filter_map(|part| part.model_text().map(str::to_owned))
            .collect()
    }
}

/// Normalize client messages for the model.
///
/// Keeps input order; drops malformed entries and entries whose text is
/// empty. Anything other than an array yields an empty list.
pub fn to_model_messages(raw: &JsonValue) -> Vec<ModelMessage> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| RawUiMessage::deserialize(item).ok())
        .filter_map(|msg| {
            let content = msg.text();
            (!content.is_empty()).then(|| ModelMessage::new(msg.role, content))
        })
        .collect()
}

/// Like [`to_model_messages`], but an empty result is a validation error.
pub fn adapt_messages(raw: &JsonValue) -> Result<Vec<ModelMessage>> {
    let messages = to_model_messages(raw);
    if messages.is_empty() {
        return Err(Error::InvalidInput(
            "no valid messages after normalization".to_string(),
        ));
    }
    Ok(messages)
}
