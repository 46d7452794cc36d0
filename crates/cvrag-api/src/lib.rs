//! # cvrag-api
//!
//! HTTP front for the CV retrieval terminal: `POST /api/chat` streams the
//! agent's answer as plain text and `GET /health` reports dependency status.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{ChunkSource, RateLimitConfig, ServerConfig};
pub use error::ApiError;
pub use routes::{router, STREAM_ERROR_MARKER};
pub use state::AppState;
