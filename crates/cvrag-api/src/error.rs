//! HTTP mapping for [`cvrag_core::Error`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    /// Model provider or retrieval failure before any output was sent.
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<cvrag_core::Error> for ApiError {
    fn from(err: cvrag_core::Error) -> Self {
        use cvrag_core::Error;
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Timeout(_) => ApiError::Timeout(err.to_string()),
            Error::Embedding(_)
            | Error::Search(_)
            | Error::Database(_)
            | Error::Inference(_)
            | Error::Request(_) => ApiError::Upstream(err.to_string()),
            Error::Config(_) | Error::Serialization(_) | Error::Internal(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<cvrag_agent::AgentFailure> for ApiError {
    fn from(failure: cvrag_agent::AgentFailure) -> Self {
        ApiError::from(cvrag_core::Error::from(failure))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(subsystem = "api", status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(subsystem = "api", status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
