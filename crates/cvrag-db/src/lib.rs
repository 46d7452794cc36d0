//! # cvrag-db
//!
//! PostgreSQL + pgvector storage layer for the CV retrieval terminal.
//!
//! This crate provides:
//! - Connection pool management
//! - A read-only chunk repository with cosine-similarity search
//! - An in-memory chunk store with the same search contract
//!
//! ## Example
//!
//! ```rust,ignore
//! use cvrag_db::{Database, VectorStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/cv", 1536).await?;
//!     let hits = db.chunks.search(&query_vector, 5, 0.3).await?;
//!     println!("{} relevant chunks", hits.len());
//!     Ok(())
//! }
//! ```
pub mod chunks;
pub mod memory;
pub mod pool;

// Re-export core types
pub use cvrag_core::*;

pub use chunks::{parse_chunk_row, PgChunkRepository};
pub use memory::MemoryChunkStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Database handle with the chunk repository.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Read-only CV chunk repository.
    pub chunks: PgChunkRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, dimension: usize) -> Self {
        Self {
            chunks: PgChunkRepository::new(pool.clone(), dimension),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str, dimension: usize) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool, dimension))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(
        url: &str,
        dimension: usize,
        config: PoolConfig,
    ) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool, dimension))
    }

    /// Read chunks from a non-default table.
    pub fn with_chunk_table(mut self, table: &str) -> Result<Self> {
        self.chunks = self.chunks.with_table(table)?;
        Ok(self)
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Check the database answers a trivial query.
    pub async fn health_check(&self) -> bool {
        log_pool_metrics(&self.pool);
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
