//! The "search the CV" tool: embed the query, look up similar chunks.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{info, trace};

use cvrag_core::{
    defaults, round_similarity, EmbeddingBackend, Error, Result, SearchResult, ToolDefinition,
    VectorStore,
};

use crate::tool::Tool;

/// Name the model uses to call the tool.
pub const SEARCH_TOOL_NAME: &str = "searchCV";

/// When the model should (and should not) reach for the tool.
pub const SEARCH_TOOL_DESCRIPTION: &str = "Search the CV for information relevant to the \
visitor's question. Use it for questions about work experience, roles, employers, skills, \
technologies, projects, education, certifications, achievements, and measurable results. \
Do not use it for greetings, small talk, off-topic requests, or follow-ups that can be \
answered from results already retrieved in this conversation. You may call it more than \
once with different queries when a question spans several topics.";

/// Arguments accepted from the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInput {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<i64>,
}

impl SearchInput {
    /// Check the argument ranges.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        if let Some(n) = self.max_results {
            if !(defaults::SEARCH_LIMIT_MIN..=defaults::SEARCH_LIMIT_MAX).contains(&n) {
                return Err(Error::InvalidInput(format!(
                    "maxResults must be between {} and {}, got {}",
                    defaults::SEARCH_LIMIT_MIN,
                    defaults::SEARCH_LIMIT_MAX,
                    n
                )));
            }
        }
        Ok(())
    }
}

/// One retrieved chunk as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub node_id: String,
    pub content: String,
    pub category: String,
    /// Rounded to three decimals.
    pub similarity: f64,
}

impl From<SearchResult> for SearchDocument {
    fn from(result: SearchResult) -> Self {
        Self {
            node_id: result.metadata.node_id,
            content: result.content,
            category: result.metadata.category,
            similarity: round_similarity(result.similarity),
        }
    }
}

/// Tool result. `documents` is always present, empty when nothing matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub query: String,
    pub found: bool,
    pub documents: Vec<SearchDocument>,
}

/// Embedding + vector store lookup behind one model-callable operation.
#[derive(Clone)]
pub struct SearchTool {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
    default_limit: i64,
    threshold: f32,
}

impl SearchTool {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn VectorStore>,
        default_limit: i64,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            default_limit,
            threshold,
        }
    }

    /// Run one validated search.
    pub async fn search(&self, input: SearchInput) -> Result<SearchOutput> {
        input.validate()?;
        let start = Instant::now();
        let limit = input.max_results.unwrap_or(self.default_limit);

        let embedding = self.embedder.embed(&input.query).await?;
        let results = self.store.search(&embedding, limit, self.threshold).await?;

        let documents: Vec<SearchDocument> =
            results.into_iter().map(SearchDocument::from).collect();

        info!(
            subsystem = "agent",
            component = "search_tool",
            op = "search",
            query = %input.query,
            limit = limit,
            result_count = documents.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "CV search complete"
        );
        for doc in &documents {
            trace!(node_id = %doc.node_id, similarity = doc.similarity, "CV search hit");
        }

        Ok(SearchOutput {
            query: input.query,
            found: !documents.is_empty(),
            documents,
        })
    }

    /// JSON Schema for [`SearchInput`].
    pub fn parameters_schema() -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "pattern": "\\S",
                    "description": "What to look for in the CV, phrased as a search query"
                },
                "maxResults": {
                    "type": "integer",
                    "minimum": defaults::SEARCH_LIMIT_MIN,
                    "maximum": defaults::SEARCH_LIMIT_MAX,
                    "description": "Maximum number of CV passages to return"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_TOOL_NAME.to_string(),
            description: SEARCH_TOOL_DESCRIPTION.to_string(),
            parameters: Self::parameters_schema(),
        }
    }

    async fn call(&self, arguments: JsonValue) -> Result<JsonValue> {
        let input: SearchInput = serde_json::from_value(arguments).map_err(|e| {
            Error::InvalidInput(format!("invalid {} arguments: {}", SEARCH_TOOL_NAME, e))
        })?;
        let output = self.search(input).await?;
        Ok(serde_json::to_value(output)?)
    }

    fn name(&self) -> String {
        SEARCH_TOOL_NAME.to_string()
    }
}
