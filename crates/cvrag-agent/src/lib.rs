//! # cvrag-agent
//!
//! The query path of the CV retrieval terminal:
//!
//! - [`message`]: normalizes client messages into text-only model messages
//! - [`search_tool`]: the `searchCV` tool over an embedder and a vector store
//! - [`agent`]: the bounded tool-calling loop with timeout, streamed as events
//!
//! ```rust,ignore
//! let agent = Agent::new(AgentConfig::from_env()?, chat, embedder, store)?;
//! let messages = adapt_messages(&body["messages"])?;
//! let answer = agent.stream(messages)?.into_text().await?;
//! ```

pub mod agent;
pub mod message;
pub mod prompt;
pub mod search_tool;
pub mod tool;

pub use agent::{Agent, AgentEvent, AgentFailure, AgentOutput, AgentStream, FinishReason};
pub use message::{adapt_messages, to_model_messages, UiPart};
pub use prompt::{OFF_TOPIC_REPLY, SYSTEM_PROMPT};
pub use search_tool::{SearchDocument, SearchInput, SearchOutput, SearchTool, SEARCH_TOOL_NAME};
pub use tool::Tool;
