//! # cvrag-core
//!
//! Core types, traits, and abstractions for the CV retrieval terminal.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the store, inference, agent, and API crates depend on.
//!
//! ## Logging
//!
//! Crates log with `tracing` and tag events with `subsystem` (`api`,
//! `agent`, `db`, `inference`), `component`, and `op`, plus measurements
//! such as `duration_ms` and `result_count`.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, fallback applied (skipped rows, failed tool calls) |
//! | INFO  | Lifecycle events and completed operations |
//! | DEBUG | Decision points and intermediate values |
//! | TRACE | Per-item data (search hits, stream deltas) |

pub mod chat;
pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod search;
pub mod traits;

// Re-export commonly used types at crate root
pub use chat::*;
pub use config::AgentConfig;
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use search::{cosine_similarity, finalize_results, round_similarity};
pub use traits::*;
