//! Integration tests for pgvector chunk search.
//!
//! **IMPORTANT**: These tests require PostgreSQL with the `vector` extension.
//! They create a scratch table per test and drop it afterwards.
//!
//! ```bash
//! DATABASE_URL=postgres://cv:cv@localhost:15432/cv_test \
//!     cargo test -p cvrag-db --test chunk_search_test -- --ignored
//! ```

use cvrag_db::{create_pool, Error, PgChunkRepository, Vector, VectorStore};
use serde_json::json;
use sqlx::PgPool;

/// Default test database URL when DATABASE_URL is not set.
const DEFAULT_TEST_DATABASE_URL: &str = "postgres://cv:cv@localhost:15432/cv_test";

/// Helper to create a test database pool.
async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
    create_pool(&database_url)
        .await
        .expect("Failed to connect to test database")
}

/// Create a 2-dimensional scratch table with a unique name.
async fn create_scratch_table(pool: &PgPool, suffix: &str) -> String {
    let table = format!("cv_chunks_test_{}", suffix);
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .expect("vector extension");
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(pool)
        .await
        .expect("drop scratch table");
    sqlx::query(&format!(
        "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, content TEXT, metadata JSONB, embedding vector(2) NOT NULL)",
        table
    ))
    .execute(pool)
    .await
    .expect("create scratch table");
    table
}

async fn insert_chunk(
    pool: &PgPool,
    table: &str,
    content: &str,
    metadata: serde_json::Value,
    embedding: Vec<f32>,
) {
    sqlx::query(&format!(
        "INSERT INTO {} (content, metadata, embedding) VALUES ($1, $2, $3)",
        table
    ))
    .bind(content)
    .bind(metadata)
    .bind(Vector::from(embedding))
    .execute(pool)
    .await
    .expect("insert chunk");
}

async fn drop_table(pool: &PgPool, table: &str) {
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(pool)
        .await
        .ok();
}

/// Unit vector whose cosine with [1, 0] is `similarity`.
fn at_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_search_applies_threshold_and_order() {
    let pool = setup_test_db().await;
    let table = create_scratch_table(&pool, "threshold").await;

    insert_chunk(&pool, &table, "high", json!({"node_id": "NODE_01", "category": "experience"}), at_similarity(0.9)).await;
    insert_chunk(&pool, &table, "mid", json!({"node_id": "NODE_02", "category": "skills"}), at_similarity(0.5)).await;
    insert_chunk(&pool, &table, "low", json!({"node_id": "NODE_03", "category": "education"}), at_similarity(0.2)).await;

    let repo = PgChunkRepository::new(pool.clone(), 2)
        .with_table(&table)
        .unwrap();
    let results = repo
        .search(&Vector::from(vec![1.0, 0.0]), 5, 0.3)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].metadata.node_id, "NODE_01");
    assert_eq!(results[1].metadata.node_id, "NODE_02");
    assert!(results[0].similarity >= results[1].similarity);
    assert!(results.iter().all(|r| r.similarity >= 0.3));

    drop_table(&pool, &table).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_search_skips_malformed_rows() {
    let pool = setup_test_db().await;
    let table = create_scratch_table(&pool, "malformed").await;

    insert_chunk(&pool, &table, "good", json!({"node_id": "NODE_01", "category": "experience"}), at_similarity(0.9)).await;
    insert_chunk(&pool, &table, "no node id", json!({"category": "skills"}), at_similarity(0.95)).await;
    insert_chunk(&pool, &table, "not an object", json!("garbage"), at_similarity(0.85)).await;

    let repo = PgChunkRepository::new(pool.clone(), 2)
        .with_table(&table)
        .unwrap();
    let results = repo
        .search(&Vector::from(vec![1.0, 0.0]), 5, 0.3)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "good");

    drop_table(&pool, &table).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_malformed_rows_do_not_shorten_results() {
    let pool = setup_test_db().await;
    let table = create_scratch_table(&pool, "short_page").await;

    insert_chunk(&pool, &table, "broken", json!({"category": "skills"}), at_similarity(0.99)).await;
    insert_chunk(&pool, &table, "first", json!({"node_id": "NODE_01", "category": "experience"}), at_similarity(0.9)).await;
    insert_chunk(&pool, &table, "second", json!({"node_id": "NODE_02", "category": "skills"}), at_similarity(0.8)).await;
    insert_chunk(&pool, &table, "third", json!({"node_id": "NODE_03", "category": "skills"}), at_similarity(0.7)).await;

    let repo = PgChunkRepository::new(pool.clone(), 2)
        .with_table(&table)
        .unwrap();
    let results = repo
        .search(&Vector::from(vec![1.0, 0.0]), 2, 0.3)
        .await
        .unwrap();

    let nodes: Vec<&str> = results.iter().map(|r| r.metadata.node_id.as_str()).collect();
    assert_eq!(nodes, vec!["NODE_01", "NODE_02"]);

    drop_table(&pool, &table).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector"]
async fn test_search_rejects_wrong_dimension() {
    let pool = setup_test_db().await;
    let repo = PgChunkRepository::new(pool, 2);

    let err = repo
        .search(&Vector::from(vec![1.0, 0.0, 0.0]), 5, 0.3)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
