//! Deterministic backends for testing.
//!
//! [`MockEmbeddingBackend`] hashes text into a unit vector so the same text
//! always embeds identically, with per-text overrides for tests that need
//! exact similarities. [`ScriptedChatBackend`] replays a queue of model turns
//! and records every request it receives.
//!
//! ```rust,ignore
//! use cvrag_inference::mock::ScriptedChatBackend;
//!
//! let chat = ScriptedChatBackend::new()
//!     .then_tool_call("call_1", "searchCV", r#"{"query":"rust"}"#)
//!     .then_text("Ten years of Rust [NODE_03].");
//! assert_eq!(chat.remaining_turns(), 2);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use cvrag_core::{
    ChatBackend, ChatEvent, ChatRequest, ChatStream, EmbeddingBackend, Error, ErrorKind, Result,
    ToolCall, Vector,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Generate a deterministic unit vector from text.
///
/// Uses character-based hashing; the same text always produces the same
/// embedding.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0; dimension];
    if dimension == 0 {
        return vec;
    }
    for (i, c) in text.chars().enumerate() {
        let idx = (c as usize + i) % dimension;
        vec[idx] += 0.1;
    }
    normalize(&mut vec);
    vec
}

fn normalize(vec: &mut [f32]) {
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
}

/// Embedding backend with deterministic output.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    overrides: Arc<HashMap<String, Vec<f32>>>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            overrides: Arc::new(HashMap::new()),
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.overrides).insert(text.into(), vector);
        self
    }

    /// Fail every call with an embedding error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of `embed_texts` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.failure {
            return Err(Error::Embedding(message.clone()));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let values = self
                    .overrides
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| deterministic_embedding(text, self.dimension));
                Vector::from(values)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

// =============================================================================
// CHAT
// =============================================================================

/// One model call's worth of scripted behaviour.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these events, then end.
    Events(Vec<ChatEvent>),
    /// Stream these events, then yield an error item.
    BrokenStream(Vec<ChatEvent>, String),
    /// Refuse the call before any event is produced.
    Fail(String),
    /// Refuse the call with an error of the given kind.
    Reject(ErrorKind, String),
}

/// Chat backend that replays queued turns in order.
#[derive(Clone, Default)]
pub struct ScriptedChatBackend {
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    fallback: Option<ScriptedTurn>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    event_delay: Duration,
}

impl ScriptedChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, turn: ScriptedTurn) -> Self {
        lock(&self.turns).push_back(turn);
        self
    }

    /// Queue a turn that answers with `text` split on word boundaries.
    pub fn then_text(self, text: &str) -> Self {
        self.push(ScriptedTurn::Events(text_events(text)))
    }

    /// Queue a turn that requests one tool call.
    pub fn then_tool_call(self, id: &str, name: &str, arguments: &str) -> Self {
        self.push(ScriptedTurn::Events(tool_call_events(id, name, arguments)))
    }

    /// Queue an arbitrary turn.
    pub fn then_turn(self, turn: ScriptedTurn) -> Self {
        self.push(turn)
    }

    /// Queue a call that fails up front.
    pub fn then_failure(self, message: &str) -> Self {
        self.push(ScriptedTurn::Fail(message.to_string()))
    }

    /// Queue a turn that refuses with an error of `kind`, e.g. a rejected key.
    pub fn then_error(self, kind: ErrorKind, message: &str) -> Self {
        self.push(ScriptedTurn::Reject(kind, message.to_string()))
    }

    /// Turn replayed whenever the queue is empty. Without one, an exhausted
    /// script fails the call.
    pub fn otherwise(mut self, turn: ScriptedTurn) -> Self {
        self.fallback = Some(turn);
        self
    }

    /// Sleep before each streamed event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining_turns(&self) -> usize {
        lock(&self.turns).len()
    }
}

/// Events for a plain text answer.
pub fn text_events(text: &str) -> Vec<ChatEvent> {
    let mut events: Vec<ChatEvent> = text
        .split_inclusive(' ')
        .map(|piece| ChatEvent::TextDelta(piece.to_string()))
        .collect();
    events.push(ChatEvent::Finish(Some("stop".to_string())));
    events
}

/// Events for a single tool call request.
pub fn tool_call_events(id: &str, name: &str, arguments: &str) -> Vec<ChatEvent> {
    vec![
        ChatEvent::ToolCall(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }),
        ChatEvent::Finish(Some("tool_calls".to_string())),
    ]
}

#[async_trait]
impl ChatBackend for ScriptedChatBackend {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        lock(&self.requests).push(request);
        let turn = lock(&self.turns).pop_front().or_else(|| self.fallback.clone());

        let items: Vec<Result<ChatEvent>> = match turn {
            Some(ScriptedTurn::Events(events)) => events.into_iter().map(Ok).collect(),
            Some(ScriptedTurn::BrokenStream(events, message)) => events
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(Error::Inference(message))))
                .collect(),
            Some(ScriptedTurn::Fail(message)) => return Err(Error::Inference(message)),
            Some(ScriptedTurn::Reject(kind, message)) => {
                return Err(Error::from_kind(kind, message))
            }
            None => {
                return Err(Error::Inference(
                    "scripted chat backend has no turns left".to_string(),
                ))
            }
        };

        let delay = self.event_delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
