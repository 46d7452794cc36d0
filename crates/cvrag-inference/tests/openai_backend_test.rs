//! Gateway client tests against a local wiremock server.
//!
//! These verify the wire contract: request shape, SSE decoding of streamed
//! text and tool calls, and classification of provider failures.

use cvrag_core::{
    ChatBackend, ChatEvent, ChatMessage, ChatRequest, EmbeddingBackend, Error, ToolCall,
    ToolChoice, ToolDefinition,
};
use cvrag_inference::openai::{OpenAIBackend, OpenAIConfig};
use futures::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, dimension: usize) -> OpenAIBackend {
    OpenAIBackend::new(OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        embed_model: "test-embed".to_string(),
        embed_dimension: dimension,
        timeout_seconds: 10,
        ..Default::default()
    })
    .expect("Failed to create backend")
}

fn chat_request() -> ChatRequest {
    ChatRequest {
        model: "test-chat".to_string(),
        messages: vec![
            ChatMessage::System("You answer questions about a CV.".to_string()),
            ChatMessage::User("What languages?".to_string()),
        ],
        tools: vec![ToolDefinition {
            name: "searchCV".to_string(),
            description: "Search the CV".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }],
        tool_choice: ToolChoice::Auto,
    }
}

fn sse_body(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|l| format!("data: {}\n\n", l))
        .collect::<String>()
}

#[tokio::test]
async fn test_embeddings_request_and_ordering() {
    let server = MockServer::start().await;

    // Out of order on purpose: the client sorts by index.
    let response = serde_json::json!({
        "data": [
            {"embedding": [0.0, 1.0], "index": 1},
            {"embedding": [1.0, 0.0], "index": 0}
        ],
        "model": "test-embed",
        "usage": {"prompt_tokens": 2, "total_tokens": 2}
    });

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({"model": "test-embed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = backend(&server, 2)
        .embed_texts(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0].as_slice(), &[1.0, 0.0]);
    assert_eq!(vectors[1].as_slice(), &[0.0, 1.0]);
}

#[tokio::test]
async fn test_embedding_dimension_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
        })))
        .mount(&server)
        .await;

    let err = backend(&server, 2).embed("hello").await.unwrap_err();
    assert!(matches!(err, Error::Embedding(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_embedding_provider_failure_is_retrieval_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = backend(&server, 2).embed("hello").await.unwrap_err();
    assert!(err.is_retrieval_failure(), "got {:?}", err);
}

#[tokio::test]
async fn test_empty_text_never_reaches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = backend(&server, 2).embed("   ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_chat_stream_text() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"id":"c1","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Rust and "},"finish_reason":null}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Go [NODE_03]."},"finish_reason":null}]}"#,
        r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-chat",
            "stream": true,
            "tool_choice": "auto"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let events: Vec<ChatEvent> = backend(&server, 2)
        .chat_stream(chat_request())
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            ChatEvent::TextDelta("Rust and ".to_string()),
            ChatEvent::TextDelta("Go [NODE_03].".to_string()),
            ChatEvent::Finish(Some("stop".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_chat_stream_tool_call() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"searchCV","arguments":""}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":\"languages\","}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"maxResults\":3}"}}]},"finish_reason":null}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
        "[DONE]",
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let events: Vec<ChatEvent> = backend(&server, 2)
        .chat_stream(chat_request())
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            ChatEvent::ToolCall(ToolCall {
                id: "call_1".to_string(),
                name: "searchCV".to_string(),
                arguments: r#"{"query":"languages","maxResults":3}"#.to_string(),
            }),
            ChatEvent::Finish(Some("tool_calls".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_chat_auth_failure_is_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Invalid API key", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let result = backend(&server, 2).chat_stream(chat_request()).await;
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("Invalid API key")),
        Err(other) => panic!("expected config error, got {:?}", other),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn test_chat_server_error_is_inference_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = backend(&server, 2).chat_stream(chat_request()).await;
    assert!(matches!(result, Err(Error::Inference(_))));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    assert!(backend(&server, 2).health_check().await.unwrap());
}

#[tokio::test]
async fn test_openrouter_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("HTTP-Referer", "https://cv.example.com"))
        .and(header("X-Title", "CV Terminal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.6, 0.8], "index": 0}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAIBackend::new(OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        embed_dimension: 2,
        http_referer: Some("https://cv.example.com".to_string()),
        x_title: Some("CV Terminal".to_string()),
        ..Default::default()
    })
    .unwrap();

    assert!(backend.embed("hello").await.is_ok());
}
