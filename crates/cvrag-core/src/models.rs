//! Data model shared by the store, tool, and agent layers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// STORED CONTENT
// =============================================================================

/// Metadata attached to every stored CV chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Stable identifier of the CV node, cited by the model as `[NODE_XX]`.
    pub node_id: String,
    /// Content category ("experience", "skills", "education", ...).
    pub category: String,
    /// Section header the chunk was cut from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Additional ingestion-time fields, preserved but not interpreted.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl ChunkMetadata {
    /// Create metadata with the two required fields.
    pub fn new(node_id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            category: category.into(),
            header: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a section header.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }
}

/// A pre-embedded piece of CV content. Read-only from the query path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A chunk matched by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// `1 - cosine_distance`; conceptually in [-1, 1].
    pub similarity: f32,
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Conversation role accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Minimal text-only message handed to the language model.
///
/// Never persisted; `content` is never empty once produced by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

impl ModelMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);

        // Roles are matched exactly, as clients send them.
        assert!("User".parse::<Role>().is_err());
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn test_chunk_metadata_with_header() {
        let json = r#"{"node_id": "NODE_07", "category": "experience", "header": "Acme Corp"}"#;
        let meta: ChunkMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.node_id, "NODE_07");
        assert_eq!(meta.category, "experience");
        assert_eq!(meta.header.as_deref(), Some("Acme Corp"));
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_chunk_metadata_preserves_extra_fields() {
        let json = r#"{"node_id": "NODE_01", "category": "skills", "source": "cv.md", "order": 3}"#;
        let meta: ChunkMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.header.is_none());
        assert_eq!(meta.extra.get("source"), Some(&serde_json::json!("cv.md")));
        assert_eq!(meta.extra.get("order"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_chunk_metadata_requires_node_id_and_category() {
        assert!(serde_json::from_str::<ChunkMetadata>(r#"{"category": "skills"}"#).is_err());
        assert!(serde_json::from_str::<ChunkMetadata>(r#"{"node_id": "NODE_01"}"#).is_err());
        assert!(serde_json::from_str::<ChunkMetadata>(r#"{"node_id": 5, "category": "x"}"#).is_err());
    }

    #[test]
    fn test_model_message_constructors() {
        let msg = ModelMessage::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert_eq!(ModelMessage::system("s").role, Role::System);
        assert_eq!(ModelMessage::assistant("a").role, Role::Assistant);
    }
}
