//! OpenAI-compatible gateway backend.
//!
//! Works with any endpoint that speaks the OpenAI embeddings and chat
//! completions protocol: OpenAI itself, the Vercel AI Gateway, OpenRouter,
//! or a local vLLM/Ollama in compatibility mode.
//!
//! # Example
//!
//! ```rust,no_run
//! use cvrag_inference::openai::OpenAIBackend;
//! use cvrag_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() -> cvrag_core::Result<()> {
//!     let backend = OpenAIBackend::from_env()?;
//!     let vector = backend.embed("Which languages does the candidate know?").await?;
//!     assert_eq!(vector.as_slice().len(), backend.dimension());
//!     Ok(())
//! }
//! ```

mod backend;
mod error;
mod streaming;
mod types;

pub use backend::{to_wire_request, OpenAIBackend, OpenAIConfig};
pub use error::{from_http_failure, to_core_error, Endpoint, OpenAIErrorCode};
pub use streaming::{parse_sse_stream, SseDecoder};
pub use types::*;
