//! pgvector-backed chunk repository.
//!
//! The table is populated by the offline ingestion job; this repository only
//! reads from it.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, trace, warn};

use cvrag_core::{
    defaults, finalize_results, ChunkMetadata, Error, Result, SearchResult, Vector, VectorStore,
};

/// Over-fetch factor, so a few malformed rows cannot shorten a result page.
const FETCH_MARGIN: i64 = 2;

/// Read-only similarity search over the CV chunk table.
#[derive(Clone)]
pub struct PgChunkRepository {
    pool: PgPool,
    table: String,
    dimension: usize,
}

impl PgChunkRepository {
    /// Create a repository over the default chunk table.
    pub fn new(pool: PgPool, dimension: usize) -> Self {
        Self {
            pool,
            table: defaults::CHUNK_TABLE.to_string(),
            dimension,
        }
    }

    /// Read from a different table.
    ///
    /// The name is interpolated into SQL, so only plain lowercase
    /// identifiers are accepted.
    pub fn with_table(mut self, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        self.table = table.to_string();
        Ok(self)
    }

    /// Table this repository reads from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of stored chunks.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get::<i64, _>("n"))
    }
}

#[async_trait]
impl VectorStore for PgChunkRepository {
    async fn search(
        &self,
        embedding: &Vector,
        limit: i64,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let query_dim = embedding.as_slice().len();
        if query_dim != self.dimension {
            return Err(Error::InvalidInput(format!(
                "query embedding has dimension {}, store expects {}",
                query_dim, self.dimension
            )));
        }
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();

        // Plain distance order keeps the HNSW index usable. The extra rows
        // cover malformed ones skipped below.
        let sql = format!(
            r#"
            SELECT id,
                   content,
                   metadata,
                   (1.0 - (embedding <=> $1::vector))::float8 AS similarity
            FROM {}
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(embedding)
            .bind(fetch_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let fetched = rows.len();
        let mut results = Vec::with_capacity(fetched);
        for row in rows {
            let id: i64 = row.try_get("id").unwrap_or_default();
            match decode_row(&row) {
                Ok(result) => {
                    trace!(
                        subsystem = "db",
                        component = "chunk_store",
                        row_id = id,
                        node_id = %result.metadata.node_id,
                        similarity = result.similarity,
                        "Search hit"
                    );
                    results.push(result);
                }
                Err(reason) => {
                    warn!(
                        subsystem = "db",
                        component = "chunk_store",
                        op = "search",
                        row_id = id,
                        error = %reason,
                        "Skipping malformed chunk row"
                    );
                }
            }
        }

        let results = finalize_results(results, limit, threshold);

        debug!(
            subsystem = "db",
            component = "chunk_store",
            op = "search",
            fetched = fetched,
            result_count = results.len(),
            threshold = threshold,
            duration_ms = start.elapsed().as_millis() as u64,
            "Vector search complete"
        );
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Rows requested from Postgres for a search returning at most `limit`.
pub fn fetch_limit(limit: i64) -> i64 {
    limit.saturating_mul(FETCH_MARGIN)
}

fn decode_row(row: &PgRow) -> std::result::Result<SearchResult, String> {
    let content: Option<String> = row.try_get("content").map_err(|e| e.to_string())?;
    let metadata: Option<JsonValue> = row.try_get("metadata").map_err(|e| e.to_string())?;
    let similarity: Option<f64> = row.try_get("similarity").map_err(|e| e.to_string())?;
    parse_chunk_row(content, metadata, similarity)
}

/// Turn raw column values into a [`SearchResult`], or explain why the row
/// has to be skipped.
pub fn parse_chunk_row(
    content: Option<String>,
    metadata: Option<JsonValue>,
    similarity: Option<f64>,
) -> std::result::Result<SearchResult, String> {
    let content = content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| "empty content".to_string())?;
    let metadata = metadata.ok_or_else(|| "missing metadata".to_string())?;
    let metadata: ChunkMetadata =
        serde_json::from_value(metadata).map_err(|e| format!("invalid metadata: {}", e))?;
    let similarity = similarity
        .filter(|s| s.is_finite())
        .ok_or_else(|| "missing similarity".to_string())?;

    Ok(SearchResult {
        content,
        metadata,
        similarity: similarity as f32,
    })
}

fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest && table.len() <= 63 {
        Ok(())
    } else {
        Err(Error::Config(format!("Invalid chunk table name: {:?}", table)))
    }
}
