//! Centralized default constants for the CV retrieval terminal.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic numbers.

// =============================================================================
// MODELS
// =============================================================================

/// Default chat model identifier at the gateway.
pub const CHAT_MODEL: &str = "gpt-4o-mini";

/// Default embedding model identifier at the gateway.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

// =============================================================================
// RETRIEVAL
// =============================================================================

/// Number of chunks returned by the search tool when the model omits `maxResults`.
pub const SEARCH_LIMIT: i64 = 5;

/// Smallest `maxResults` the search tool accepts.
pub const SEARCH_LIMIT_MIN: i64 = 1;

/// Largest `maxResults` the search tool accepts.
pub const SEARCH_LIMIT_MAX: i64 = 10;

/// Minimum cosine similarity for a chunk to count as relevant.
///
/// Chosen empirically: lower values let noise through, higher values make
/// loosely-phrased but legitimate questions come back empty.
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

/// Decimal places kept when reporting similarity to the model.
pub const SIMILARITY_DECIMALS: i32 = 3;

/// Table holding the pre-embedded CV chunks.
pub const CHUNK_TABLE: &str = "cv_chunks";

// =============================================================================
// AGENT
// =============================================================================

/// Maximum model calls (tool-call round trips included) per turn.
pub const MAX_STEPS: usize = 5;

/// Wall-clock budget for one chat request, in milliseconds.
pub const TIMEOUT_MS: u64 = 30_000;

/// Buffer size of the per-request event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// GATEWAY
// =============================================================================

/// Default OpenAI-compatible gateway endpoint.
pub const GATEWAY_URL: &str = "https://api.openai.com/v1";

/// HTTP timeout for individual gateway calls, in seconds.
pub const GATEWAY_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// HTTP
// =============================================================================

/// Maximum accepted request body for the chat endpoint.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Default listen port.
pub const PORT: u16 = 3000;
