//! # cvrag-inference
//!
//! Model gateway access for the CV retrieval terminal.
//!
//! This crate provides:
//! - An OpenAI-compatible client implementing [`EmbeddingBackend`] and
//!   [`ChatBackend`] with streamed tool calling
//! - Provider error classification
//! - Deterministic mock backends (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable [`mock::MockEmbeddingBackend`] and
//!   [`mock::ScriptedChatBackend`] for downstream tests
//!
//! [`EmbeddingBackend`]: cvrag_core::EmbeddingBackend
//! [`ChatBackend`]: cvrag_core::ChatBackend

pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use openai::{OpenAIBackend, OpenAIConfig};

// Re-export core types
pub use cvrag_core::{ChatBackend, EmbeddingBackend, Error, Result};
