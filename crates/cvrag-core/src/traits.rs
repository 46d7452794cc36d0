//! Core traits for the retrieval and inference abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;

use crate::chat::{ChatRequest, ChatStream};
use crate::error::{Error, Result};
use crate::models::{SearchResult, Vector};

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Embed a single non-empty text.
    ///
    /// Never substitutes a zero vector: a missing result is an
    /// [`Error::Embedding`].
    async fn embed(&self, text: &str) -> Result<Vector> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("provider returned no embedding".to_string()))
    }

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for streaming chat completions with tool calling.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streaming model call.
    ///
    /// Errors before the first event (bad credentials, unknown model) are
    /// returned here; errors mid-stream arrive as stream items.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream>;

    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// RETRIEVAL TRAITS
// =============================================================================

/// Read-only nearest-neighbour search over stored chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return at most `limit` chunks with `similarity >= threshold`,
    /// ordered by similarity descending.
    async fn search(
        &self,
        embedding: &Vector,
        limit: i64,
        threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Dimension of the stored embeddings.
    fn dimension(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder {
        vectors: Vec<Vector>,
    }

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vector>> {
            Ok(self.vectors.clone())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_embed_returns_first_vector() {
        let backend = FixedEmbedder {
            vectors: vec![Vector::from(vec![1.0, 0.0, 0.0])],
        };
        let v = backend.embed("hello").await.unwrap();
        assert_eq!(v.as_slice(), &[1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_text() {
        let backend = FixedEmbedder { vectors: vec![] };
        let err = backend.embed("   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_embed_missing_vector_is_embedding_error() {
        let backend = FixedEmbedder { vectors: vec![] };
        let err = backend.embed("hello").await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
