//! OpenAI-compatible gateway backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use cvrag_core::config::{env_parse, env_string};
use cvrag_core::{
    defaults, ChatBackend, ChatRequest, ChatStream, EmbeddingBackend, Error, Result, ToolChoice,
    Vector,
};

use super::error::{from_http_failure, Endpoint};
use super::streaming::parse_sse_stream;
use super::types::*;

/// Configuration for the OpenAI-compatible gateway.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Gateway root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token; `None` only for unauthenticated local gateways.
    pub api_key: Option<String>,
    /// Must match the model the chunk table was embedded with.
    pub embed_model: String,
    /// Length every returned embedding is checked against.
    pub embed_dimension: usize,
    /// Whole-request timeout, seconds.
    pub timeout_seconds: u64,
    /// Accept self-signed certificates. Local proxies only.
    pub skip_tls_verify: bool,
    /// Sent as `HTTP-Referer` (OpenRouter attribution).
    pub http_referer: Option<String>,
    /// Sent as `X-Title` (OpenRouter attribution).
    pub x_title: Option<String>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::GATEWAY_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::GATEWAY_TIMEOUT_SECS,
            skip_tls_verify: false,
            http_referer: None,
            x_title: None,
        }
    }
}

impl OpenAIConfig {
    /// Load from environment variables.
    ///
    /// The gateway key is mandatory: `OPENAI_API_KEY`, or `AI_GATEWAY_API_KEY`
    /// when the former is unset.
    pub fn from_env() -> Result<Self> {
        let api_key = env_string("OPENAI_API_KEY")
            .or_else(|| env_string("AI_GATEWAY_API_KEY"))
            .ok_or_else(|| {
                Error::Config(
                    "OPENAI_API_KEY (or AI_GATEWAY_API_KEY) must be set".to_string(),
                )
            })?;

        let mut config = Self {
            api_key: Some(api_key),
            ..Self::default()
        };
        if let Some(url) = env_string("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Some(model) = env_string("EMBEDDING_MODEL") {
            config.embed_model = model;
        }
        if let Some(dim) = env_parse("EMBEDDING_DIMENSION")? {
            config.embed_dimension = dim;
        }
        if let Some(timeout) = env_parse("OPENAI_TIMEOUT")? {
            config.timeout_seconds = timeout;
        }
        config.skip_tls_verify = env_string("OPENAI_SKIP_TLS_VERIFY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config.http_referer = env_string("OPENAI_HTTP_REFERER");
        config.x_title = env_string("OPENAI_X_TITLE");
        Ok(config)
    }
}

/// Client for an OpenAI-compatible gateway: embeddings plus streaming chat.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let mut client_builder =
            Client::builder().timeout(Duration::from_secs(config.timeout_seconds));

        if config.skip_tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "gateway",
            base_url = %config.base_url,
            model = %config.embed_model,
            dimension = config.embed_dimension,
            "Initializing gateway backend"
        );

        Ok(Self { client, config })
    }

    /// Backend configured by [`OpenAIConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// POST to `endpoint` with auth and attribution headers.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.url(endpoint));

        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }
        if let Some(ref referer) = self.config.http_referer {
            req = req.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.config.x_title {
            req = req.header("X-Title", title);
        }

        req.header("Content-Type", "application/json")
    }

    fn build_get_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(self.url(endpoint));
        if let Some(ref api_key) = self.config.api_key {
            req = req.bearer_auth(api_key);
        }
        req
    }
}

/// Convert a chat request into the wire body.
///
/// Tools are only sent when there are some; `tool_choice` without tools is
/// rejected by most providers.
pub fn to_wire_request(request: &ChatRequest) -> ChatCompletionRequest {
    let (tools, tool_choice) = if request.tools.is_empty() {
        (None, None)
    } else {
        let choice = match request.tool_choice {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
        };
        (
            Some(request.tools.iter().map(WireTool::from).collect()),
            Some(choice.to_string()),
        )
    };

    ChatCompletionRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(WireMessage::from).collect(),
        tools,
        tool_choice,
        temperature: None,
        stream: true,
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(from_http_failure(Endpoint::Embeddings, status.as_u16(), &body));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, provider returned {}",
                texts.len(),
                result.data.len()
            )));
        }

        // The API may return items out of input order.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            if item.embedding.len() != self.config.embed_dimension {
                return Err(Error::Embedding(format!(
                    "embedding has dimension {}, expected {}",
                    item.embedding.len(),
                    self.config.embed_dimension
                )));
            }
            vectors.push(Vector::from(item.embedding));
        }

        debug!(
            subsystem = "inference",
            component = "gateway",
            op = "embed",
            model = %self.config.embed_model,
            input_count = texts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embeddings generated"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl ChatBackend for OpenAIBackend {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        debug!(
            subsystem = "inference",
            component = "gateway",
            op = "chat",
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "Starting streaming chat completion"
        );

        let body = to_wire_request(&request);
        let response = self
            .build_request("/chat/completions")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(from_http_failure(Endpoint::Chat, status.as_u16(), &body));
        }

        Ok(parse_sse_stream(Box::pin(response.bytes_stream())))
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .build_get_request("/models")
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    status = resp.status().as_u16(),
                    "Gateway health check failed"
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "gateway",
                    error = %e,
                    "Gateway health check error"
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvrag_core::{ChatMessage, ToolDefinition};

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, defaults::GATEWAY_URL);
        assert_eq!(config.embed_model, defaults::EMBED_MODEL);
        assert_eq!(config.embed_dimension, defaults::EMBED_DIMENSION);
        assert_eq!(config.timeout_seconds, defaults::GATEWAY_TIMEOUT_SECS);
        assert!(!config.skip_tls_verify);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_dimension_and_model_accessors() {
        let config = OpenAIConfig {
            embed_model: "test-embed".to_string(),
            embed_dimension: 512,
            ..Default::default()
        };
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.dimension(), 512);
        assert_eq!(backend.model_name(), "test-embed");
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let backend = OpenAIBackend::new(OpenAIConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.url("/embeddings"), "http://localhost:8080/v1/embeddings");
    }

    fn request(tools: Vec<ToolDefinition>) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                ChatMessage::System("be brief".to_string()),
                ChatMessage::User("hi".to_string()),
            ],
            tools,
            tool_choice: ToolChoice::Auto,
        }
    }

    #[test]
    fn test_wire_request_with_tools() {
        let wire = to_wire_request(&request(vec![ToolDefinition {
            name: "searchCV".to_string(),
            description: "search".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }]));
        assert!(wire.stream);
        assert_eq!(wire.tool_choice.as_deref(), Some("auto"));
        assert_eq!(wire.tools.as_ref().map(|t| t.len()), Some(1));
        assert_eq!(wire.messages[0].role, "system");
    }

    #[test]
    fn test_wire_request_without_tools_omits_choice() {
        let wire = to_wire_request(&request(vec![]));
        assert!(wire.tools.is_none());
        assert!(wire.tool_choice.is_none());
    }
}
