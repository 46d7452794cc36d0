//! Provider error classification.

use cvrag_core::Error;

use super::types::OpenAIErrorResponse;

/// Gateway error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401 | 403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Which gateway endpoint failed. Embedding failures surface as retrieval
/// errors, chat failures as inference errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Embeddings,
    Chat,
}

/// Build a core error from a failed gateway response.
///
/// `body` is the raw response body; the provider's own message is used when
/// it parses, the status line otherwise.
pub fn from_http_failure(endpoint: Endpoint, status: u16, body: &str) -> Error {
    let (message, error_type) = match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => (
            parsed.error.message,
            parsed.error.error_type.unwrap_or_default(),
        ),
        Err(_) => (format!("HTTP {}: {}", status, truncate(body, 200)), String::new()),
    };
    let code = OpenAIErrorCode::from_response(status, &error_type);
    to_core_error(endpoint, code, &message)
}

/// Convert a classified provider failure into a core error.
pub fn to_core_error(endpoint: Endpoint, code: OpenAIErrorCode, message: &str) -> Error {
    let detail = match code {
        OpenAIErrorCode::AuthenticationError => {
            return Error::Config(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => {
            return Error::Config(format!("Model not found: {}", message))
        }
        OpenAIErrorCode::RateLimitExceeded => format!("Rate limit exceeded: {}", message),
        OpenAIErrorCode::ContextLengthExceeded => format!("Context too long: {}", message),
        OpenAIErrorCode::ServerError => format!("Server error: {}", message),
        OpenAIErrorCode::Unknown => message.to_string(),
    };
    match endpoint {
        Endpoint::Embeddings => Error::Embedding(detail),
        Endpoint::Chat => Error::Inference(detail),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
