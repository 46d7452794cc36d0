//! Error types for the CV retrieval terminal.

use thiserror::Error;

/// Result type alias using the crate-wide Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for retrieval, inference, and agent operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Required credentials or connection strings are missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request input or tool arguments.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store lookup failed
    #[error("Search error: {0}")]
    Search(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Upstream model/provider failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// The wall-clock budget for a request elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse class of an [`Error`], for places the error itself cannot travel
/// (it is neither `Clone` nor `PartialEq`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    InvalidInput,
    /// Embedding or vector store failure.
    Retrieval,
    Timeout,
    /// Model provider or transport failure.
    Provider,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Embedding(_) | Error::Search(_) | Error::Database(_) => ErrorKind::Retrieval,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Inference(_) | Error::Request(_) => ErrorKind::Provider,
            Error::Serialization(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Config(m)
            | Error::InvalidInput(m)
            | Error::Embedding(m)
            | Error::Search(m)
            | Error::Inference(m)
            | Error::Timeout(m)
            | Error::Serialization(m)
            | Error::Request(m)
            | Error::Internal(m) => m.clone(),
            Error::Database(e) => e.to_string(),
        }
    }

    /// Rebuild an error from its kind and message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Config => Error::Config(message),
            ErrorKind::InvalidInput => Error::InvalidInput(message),
            ErrorKind::Retrieval => Error::Search(message),
            ErrorKind::Timeout => Error::Timeout(message),
            ErrorKind::Provider => Error::Inference(message),
            ErrorKind::Internal => Error::Internal(message),
        }
    }

    /// True for errors caused by the caller's input (surfaced as 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// True for embedding or vector-store failures.
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(
            self,
            Error::Embedding(_) | Error::Search(_) | Error::Database(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
