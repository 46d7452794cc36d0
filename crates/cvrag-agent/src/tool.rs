//! Capabilities the model can invoke mid-turn.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use cvrag_core::{Result, ToolDefinition};

/// A named, schema-described operation exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description, and argument schema advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute with already-parsed JSON arguments.
    ///
    /// Argument validation failures are [`cvrag_core::Error::InvalidInput`];
    /// the agent reports any error back to the model as a tool result.
    async fn call(&self, arguments: JsonValue) -> Result<JsonValue>;

    /// Name used to route tool calls.
    fn name(&self) -> String {
        self.definition().name
    }
}
