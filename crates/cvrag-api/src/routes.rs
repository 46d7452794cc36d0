//! HTTP routes and middleware stack.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde_json::Value as JsonValue;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use cvrag_agent::{adapt_messages, AgentEvent, AgentStream, FinishReason};
use cvrag_core::Error;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::state::AppState;

/// Appended to the body when the answer breaks off after streaming began.
pub const STREAM_ERROR_MARKER: &str = "\n\n[error] The assistant could not finish this answer.";

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors_layer(&config.allowed_origins))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<JsonValue>)> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!(subsystem = "api", "Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

/// `POST /api/chat`: answer the conversation as a plain-text stream.
///
/// The body is parsed here rather than by an extractor so that malformed
/// JSON gets the same `{ "error": ... }` shape as other validation failures.
async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let body: JsonValue = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Request body is not valid JSON: {}", e)))?;
    if !body.is_object() {
        return Err(ApiError::BadRequest(
            "Request body must be a JSON object with a messages array".to_string(),
        ));
    }

    let messages = adapt_messages(&body["messages"])?;
    info!(
        subsystem = "api",
        op = "chat",
        message_count = messages.len(),
        "Chat request accepted"
    );
    let mut stream = state.agent.stream(messages)?;

    // Hold the status line until the turn produces text, so a failure before
    // any output still gets its own status code.
    let first = loop {
        match stream.next().await {
            Some(AgentEvent::Text(text)) => break Some(text),
            Some(AgentEvent::Error(failure)) => return Err(failure.into()),
            Some(AgentEvent::Done(FinishReason::Timeout)) => {
                return Err(Error::Timeout(format!(
                    "no answer within {} ms",
                    state.agent.config().timeout_ms
                ))
                .into())
            }
            Some(AgentEvent::Done(_)) | None => break None,
            Some(AgentEvent::ToolCall(_)) | Some(AgentEvent::ToolResult { .. }) => {}
        }
    };

    let body = futures::stream::iter(first.map(Ok)).chain(text_body(stream));
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// Answer text after the first fragment.
///
/// An error after streaming began cannot change the status code, so it is
/// reported inline. A timeout just ends the body.
fn text_body(stream: AgentStream) -> impl Stream<Item = Result<String, Infallible>> + Send {
    stream.filter_map(|event| async move {
        match event {
            AgentEvent::Text(text) => Some(Ok(text)),
            AgentEvent::Error(_) => Some(Ok(STREAM_ERROR_MARKER.to_string())),
            _ => None,
        }
    })
}

/// `GET /health`: database and gateway reachability.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => {
            if db.health_check().await {
                "ok"
            } else {
                "unavailable"
            }
        }
        None => "not_configured",
    };
    let gateway = match state.gateway.health_check().await {
        Ok(true) => "ok",
        _ => "unavailable",
    };

    let healthy = database != "unavailable" && gateway == "ok";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "gateway": gateway,
        })),
    )
}
