//! In-process chunk store.
//!
//! Brute-force cosine search over chunks held in memory. Used by tests and
//! for running the terminal against a JSON snapshot of the chunk table
//! without PostgreSQL.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use cvrag_core::{
    cosine_similarity, finalize_results, ContentChunk, Error, Result, SearchResult, Vector,
    VectorStore,
};

/// Immutable set of pre-embedded chunks searched in storage order.
#[derive(Debug, Clone, Default)]
pub struct MemoryChunkStore {
    chunks: Vec<ContentChunk>,
    dimension: usize,
}

impl MemoryChunkStore {
    /// Create an empty store for embeddings of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            chunks: Vec::new(),
            dimension,
        }
    }

    /// Build a store from chunks, rejecting any with the wrong dimension or
    /// empty content.
    pub fn from_chunks(
        dimension: usize,
        chunks: impl IntoIterator<Item = ContentChunk>,
    ) -> Result<Self> {
        let mut store = Self::new(dimension);
        for chunk in chunks {
            store.insert(chunk)?;
        }
        Ok(store)
    }

    /// Parse a JSON array of chunks (the ingestion job's snapshot format).
    pub fn from_json(dimension: usize, json: &str) -> Result<Self> {
        let chunks: Vec<ContentChunk> = serde_json::from_str(json)?;
        Self::from_chunks(dimension, chunks)
    }

    /// Load a JSON snapshot from disk.
    pub async fn load_json_file(dimension: usize, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Cannot read chunk snapshot {}: {}", path.display(), e))
        })?;
        let store = Self::from_json(dimension, &json)?;
        info!(
            subsystem = "db",
            component = "memory_store",
            op = "load",
            path = %path.display(),
            chunk_count = store.len(),
            "Loaded chunk snapshot"
        );
        Ok(store)
    }

    /// Add one chunk.
    pub fn insert(&mut self, chunk: ContentChunk) -> Result<()> {
        if chunk.embedding.len() != self.dimension {
            return Err(Error::InvalidInput(format!(
                "chunk {} has embedding dimension {}, store expects {}",
                chunk.metadata.node_id,
                chunk.embedding.len(),
                self.dimension
            )));
        }
        if chunk.content.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "chunk {} has empty content",
                chunk.metadata.node_id
            )));
        }
        self.chunks.push(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryChunkStore {
    async fn search(
        &self,
        embedding: &Vector,
        limit: i64,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let query = embedding.as_slice();
        if query.len() != self.dimension {
            return Err(Error::InvalidInput(format!(
                "query embedding has dimension {}, store expects {}",
                query.len(),
                self.dimension
            )));
        }

        let scored = self
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                similarity: cosine_similarity(query, &chunk.embedding),
            })
            .collect();

        let results = finalize_results(scored, limit, threshold);
        debug!(
            subsystem = "db",
            component = "memory_store",
            op = "search",
            result_count = results.len(),
            threshold = threshold,
            "Vector search complete"
        );
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
