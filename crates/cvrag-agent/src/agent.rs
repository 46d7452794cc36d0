//! Bounded tool-calling loop with a wall-clock budget.
//!
//! A turn is a sequence of model calls. Each call either answers (the turn
//! ends) or requests tool calls, whose results are appended to the
//! conversation before the next call. At most `max_steps` calls are made; on
//! the last one tool use is switched off so the model has to answer. The
//! whole turn runs under one deadline fixed when [`Agent::stream`] is called.
//!
//! Events are produced by a spawned task and consumed through
//! [`AgentStream`]. Dropping the stream cancels the task.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn, Instrument};

use cvrag_core::{
    defaults, AgentConfig, ChatBackend, ChatEvent, ChatMessage, ChatRequest, EmbeddingBackend,
    Error, ErrorKind, ModelMessage, Result, ToolCall, ToolChoice, ToolDefinition, VectorStore,
};

use crate::prompt::SYSTEM_PROMPT;
use crate::search_tool::SearchTool;
use crate::tool::Tool;

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered.
    Stop,
    /// The step budget ran out; the answer came from the tool-less final call.
    StepLimit,
    /// The deadline elapsed; output already sent is kept.
    Timeout,
    /// The consumer went away.
    Cancelled,
    /// A provider error ended the turn.
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::StepLimit => "step_limit",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed turn, reduced to what can be cloned and compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for AgentFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.message(),
        }
    }
}

impl From<AgentFailure> for Error {
    fn from(failure: AgentFailure) -> Self {
        Error::from_kind(failure.kind, failure.message)
    }
}

impl std::fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Item of an [`AgentStream`]. `Done` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Fragment of model output, in order.
    Text(String),
    /// The model asked for a tool.
    ToolCall(ToolCall),
    /// Result handed back to the model. Failed calls carry `{"error": ...}`.
    ToolResult {
        call_id: String,
        name: String,
        output: JsonValue,
        is_error: bool,
    },
    /// The turn failed; no text follows.
    Error(AgentFailure),
    Done(FinishReason),
}

/// Everything a turn produced, collected.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub error: Option<AgentFailure>,
}

/// Streamed events of one turn.
pub struct AgentStream {
    events: ReceiverStream<AgentEvent>,
    task: JoinHandle<()>,
}

impl AgentStream {
    /// Drain the stream.
    pub async fn collect_output(mut self) -> AgentOutput {
        let mut output = AgentOutput {
            text: String::new(),
            tool_calls: Vec::new(),
            // Channel closed without `Done`: the task was torn down.
            finish_reason: FinishReason::Cancelled,
            error: None,
        };
        while let Some(event) = self.next().await {
            match event {
                AgentEvent::Text(delta) => output.text.push_str(&delta),
                AgentEvent::ToolCall(call) => output.tool_calls.push(call),
                AgentEvent::ToolResult { .. } => {}
                AgentEvent::Error(failure) => output.error = Some(failure),
                AgentEvent::Done(reason) => {
                    output.finish_reason = reason;
                    break;
                }
            }
        }
        output
    }

    /// Concatenated text of the turn. A failed turn returns its error with
    /// the original kind; a timed-out turn returns the partial text.
    pub async fn into_text(self) -> Result<String> {
        let output = self.collect_output().await;
        match output.error {
            Some(failure) => Err(failure.into()),
            None => Ok(output.text),
        }
    }
}

impl Stream for AgentStream {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AgentEvent>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for AgentStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Orchestrates one conversation turn per [`Agent::stream`] call.
///
/// Cloning is cheap; concurrent turns share only immutable state.
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
    chat: Arc<dyn ChatBackend>,
    tools: Arc<[Arc<dyn Tool>]>,
    system_prompt: Arc<str>,
}

impl Agent {
    /// Agent with the CV search tool as its only capability.
    pub fn new(
        config: AgentConfig,
        chat: Arc<dyn ChatBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(Error::Config(format!(
                "embedding dimension {} does not match store dimension {}",
                embedder.dimension(),
                store.dimension()
            )));
        }
        let search = SearchTool::new(
            embedder,
            store,
            config.search_limit,
            config.similarity_threshold,
        );
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(search)];
        Self::with_tools(config, chat, tools)
    }

    /// Agent with an explicit tool set.
    pub fn with_tools(
        config: AgentConfig,
        chat: Arc<dyn ChatBackend>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            chat,
            tools: tools.into(),
            system_prompt: Arc::from(SYSTEM_PROMPT),
        })
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt: String = prompt.into();
        self.system_prompt = Arc::from(prompt);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tool definitions advertised to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Start a turn over already-normalized messages.
    ///
    /// The deadline starts now. Must be called inside a Tokio runtime.
    pub fn stream(&self, messages: Vec<ModelMessage>) -> Result<AgentStream> {
        if messages.is_empty() {
            return Err(Error::InvalidInput("no messages to answer".to_string()));
        }

        let deadline = Instant::now() + self.config.timeout();
        let (tx, rx) = mpsc::channel(defaults::EVENT_CHANNEL_CAPACITY);
        let agent = self.clone();
        let task = tokio::spawn(
            async move { agent.run_turn(messages, tx, deadline).await }.in_current_span(),
        );

        Ok(AgentStream {
            events: ReceiverStream::new(rx),
            task,
        })
    }

    async fn run_turn(
        &self,
        messages: Vec<ModelMessage>,
        tx: mpsc::Sender<AgentEvent>,
        deadline: Instant,
    ) {
        let start = Instant::now();
        info!(
            subsystem = "agent",
            component = "agent",
            op = "turn",
            model = %self.config.chat_model,
            message_count = messages.len(),
            max_steps = self.config.max_steps,
            timeout_ms = self.config.timeout_ms,
            "Agent turn started"
        );

        let outcome = tokio::select! {
            biased;
            _ = tx.closed() => Ok(FinishReason::Cancelled),
            result = tokio::time::timeout_at(deadline, self.drive(messages, &tx)) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            subsystem = "agent",
                            component = "agent",
                            timeout_ms = self.config.timeout_ms,
                            "Agent turn timed out; cancelling model call"
                        );
                        Ok(FinishReason::Timeout)
                    }
                }
            }
        };

        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                error!(
                    subsystem = "agent",
                    component = "agent",
                    op = "turn",
                    error = %e,
                    "Agent turn failed"
                );
                let _ = tx.send(AgentEvent::Error(AgentFailure::from(&e))).await;
                FinishReason::Error
            }
        };

        info!(
            subsystem = "agent",
            component = "agent",
            op = "turn",
            finish_reason = %reason,
            duration_ms = start.elapsed().as_millis() as u64,
            "Agent turn finished"
        );
        let _ = tx.send(AgentEvent::Done(reason)).await;
    }

    async fn drive(
        &self,
        messages: Vec<ModelMessage>,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<FinishReason> {
        let definitions = self.tool_definitions();
        let mut conversation = Vec::with_capacity(messages.len() + 1);
        conversation.push(ChatMessage::System(self.system_prompt.to_string()));
        conversation.extend(messages.into_iter().map(ChatMessage::from));

        let max_steps = self.config.max_steps;
        for step in 1..=max_steps {
            let final_step = step == max_steps;
            let tool_choice = if final_step {
                ToolChoice::None
            } else {
                ToolChoice::Auto
            };

            debug!(
                subsystem = "agent",
                step = step,
                final_step = final_step,
                message_count = conversation.len(),
                "Calling model"
            );
            let request = ChatRequest {
                model: self.config.chat_model.clone(),
                messages: conversation.clone(),
                tools: definitions.clone(),
                tool_choice,
            };
            let mut events = self.chat.chat_stream(request).await?;

            let mut text = String::new();
            let mut calls = Vec::new();
            while let Some(event) = events.next().await {
                match event? {
                    ChatEvent::TextDelta(delta) => {
                        text.push_str(&delta);
                        if tx.send(AgentEvent::Text(delta)).await.is_err() {
                            return Ok(FinishReason::Cancelled);
                        }
                    }
                    ChatEvent::ToolCall(call) => calls.push(call),
                    ChatEvent::Finish(reason) => {
                        debug!(
                            subsystem = "agent",
                            step = step,
                            provider_reason = ?reason,
                            "Model call finished"
                        );
                    }
                }
            }

            if calls.is_empty() {
                return Ok(if final_step && step > 1 {
                    FinishReason::StepLimit
                } else {
                    FinishReason::Stop
                });
            }
            if final_step {
                warn!(
                    subsystem = "agent",
                    step = step,
                    ignored = calls.len(),
                    "Model requested tools after the step budget; ignoring"
                );
                return Ok(FinishReason::StepLimit);
            }

            conversation.push(ChatMessage::Assistant {
                content: (!text.is_empty()).then_some(text),
                tool_calls: calls.clone(),
            });
            for call in calls {
                if tx.send(AgentEvent::ToolCall(call.clone())).await.is_err() {
                    return Ok(FinishReason::Cancelled);
                }
                let (output, is_error) = self.invoke_tool(&call, step).await;
                conversation.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: output.to_string(),
                });
                let event = AgentEvent::ToolResult {
                    call_id: call.id,
                    name: call.name,
                    output,
                    is_error,
                };
                if tx.send(event).await.is_err() {
                    return Ok(FinishReason::Cancelled);
                }
            }
        }

        Ok(FinishReason::StepLimit)
    }

    /// Run one tool call. Failures become an `{"error": ...}` result so the
    /// model can carry on without that data.
    async fn invoke_tool(&self, call: &ToolCall, step: usize) -> (JsonValue, bool) {
        let start = Instant::now();
        let result = match self.tools.iter().find(|t| t.name() == call.name) {
            None => Err(Error::InvalidInput(format!("unknown tool: {}", call.name))),
            Some(tool) => match parse_arguments(&call.arguments) {
                Ok(arguments) => tool.call(arguments).await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(output) => {
                info!(
                    subsystem = "agent",
                    component = "agent",
                    op = "tool_call",
                    tool = %call.name,
                    step = step,
                    success = true,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call complete"
                );
                (output, false)
            }
            Err(e) => {
                warn!(
                    subsystem = "agent",
                    component = "agent",
                    op = "tool_call",
                    tool = %call.name,
                    step = step,
                    success = false,
                    error = %e,
                    "Tool call failed; reporting error to model"
                );
                (json!({ "error": e.to_string() }), true)
            }
        }
    }
}

/// Parse model-produced arguments. Empty means no arguments.
fn parse_arguments(raw: &str) -> Result<JsonValue> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidInput(format!("tool arguments are not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cvrag_inference::mock::{ScriptedChatBackend, ScriptedTurn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes its arguments and counts calls.
    struct EchoTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the arguments".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn call(&self, arguments: JsonValue) -> Result<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if arguments.get("fail").is_some() {
                return Err(Error::Search("store unavailable".to_string()));
            }
            Ok(json!({ "echo": arguments }))
        }
    }

    fn agent(chat: ScriptedChatBackend, config: AgentConfig) -> (Agent, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool = EchoTool {
            calls: Arc::clone(&calls),
        };
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(tool)];
        let agent = Agent::with_tools(config, Arc::new(chat), tools).unwrap();
        (agent, calls)
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(parse_arguments("{oops").unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn test_plain_answer_without_tools() {
        let chat = ScriptedChatBackend::new().then_text("Hello, ask me about the CV.");
        let (agent, calls) = agent(chat.clone(), AgentConfig::default());

        let output = agent
            .stream(vec![ModelMessage::user("hi")])
            .unwrap()
            .collect_output()
            .await;

        assert_eq!(output.text, "Hello, ask me about the CV.");
        assert_eq!(output.finish_reason, FinishReason::Stop);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let requests = chat.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
        assert_eq!(requests[0].tools.len(), 1);
        assert!(matches!(requests[0].messages[0], ChatMessage::System(_)));
        assert_eq!(requests[0].messages[1], ChatMessage::User("hi".to_string()));
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let chat = ScriptedChatBackend::new()
            .then_tool_call("call_1", "echo", r#"{"q":"rust"}"#)
            .then_text("Done.");
        let (agent, calls) = agent(chat.clone(), AgentConfig::default());

        let mut stream = agent.stream(vec![ModelMessage::user("rust?")]).unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(&events[0], AgentEvent::ToolCall(c) if c.id == "call_1"));
        assert!(matches!(
            &events[1],
            AgentEvent::ToolResult { is_error: false, .. }
        ));
        assert_eq!(events.last(), Some(&AgentEvent::Done(FinishReason::Stop)));

        let second = &chat.requests()[1];
        let tool_message = second.messages.last().unwrap();
        assert_eq!(
            tool_message,
            &ChatMessage::Tool {
                tool_call_id: "call_1".to_string(),
                content: json!({"echo": {"q": "rust"}}).to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_to_model() {
        let chat = ScriptedChatBackend::new()
            .then_tool_call("call_1", "echo", r#"{"fail":true}"#)
            .then_text("Search is unavailable right now.");
        let (agent, _) = agent(chat.clone(), AgentConfig::default());

        let output = agent
            .stream(vec![ModelMessage::user("rust?")])
            .unwrap()
            .collect_output()
            .await;

        assert_eq!(output.finish_reason, FinishReason::Stop);
        assert!(output.error.is_none());
        match chat.requests()[1].messages.last().unwrap() {
            ChatMessage::Tool { content, .. } => assert!(content.contains("store unavailable")),
            other => panic!("expected tool message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments() {
        let chat = ScriptedChatBackend::new()
            .then_tool_call("a", "nope", "{}")
            .then_tool_call("b", "echo", "{not json")
            .then_text("ok");
        let (agent, calls) = agent(chat, AgentConfig::default());

        let mut stream = agent.stream(vec![ModelMessage::user("x")]).unwrap();
        let mut errors = 0;
        while let Some(event) = stream.next().await {
            if let AgentEvent::ToolResult { is_error: true, .. } = event {
                errors += 1;
            }
        }
        assert_eq!(errors, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_step_limit_forces_answer() {
        let chat = ScriptedChatBackend::new().otherwise(ScriptedTurn::Events(
            cvrag_inference::mock::tool_call_events("c", "echo", "{}"),
        ));
        let (agent, calls) = agent(chat.clone(), AgentConfig::default().with_max_steps(3));

        let output = agent
            .stream(vec![ModelMessage::user("loop")])
            .unwrap()
            .collect_output()
            .await;

        assert_eq!(output.finish_reason, FinishReason::StepLimit);
        assert_eq!(chat.call_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let requests = chat.requests();
        assert_eq!(requests[2].tool_choice, ToolChoice::None);
        assert!(requests[..2].iter().all(|r| r.tool_choice == ToolChoice::Auto));
    }

    #[tokio::test]
    async fn test_provider_error_ends_turn() {
        let chat = ScriptedChatBackend::new().then_turn(ScriptedTurn::BrokenStream(
            vec![ChatEvent::TextDelta("Partial ".to_string())],
            "upstream reset".to_string(),
        ));
        let (agent, _) = agent(chat, AgentConfig::default());

        let output = agent
            .stream(vec![ModelMessage::user("x")])
            .unwrap()
            .collect_output()
            .await;

        assert_eq!(output.text, "Partial ");
        assert_eq!(output.finish_reason, FinishReason::Error);
        let failure = output.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::Provider);
        assert!(failure.message.contains("upstream reset"));
    }

    #[tokio::test]
    async fn test_failure_keeps_error_kind() {
        let chat = ScriptedChatBackend::new().then_error(ErrorKind::Config, "401 invalid key");
        let (streamed, _) = agent(chat, AgentConfig::default());

        let events: Vec<AgentEvent> = streamed
            .stream(vec![ModelMessage::user("x")])
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                AgentEvent::Error(AgentFailure {
                    kind: ErrorKind::Config,
                    message: "401 invalid key".to_string(),
                }),
                AgentEvent::Done(FinishReason::Error),
            ]
        );

        let chat = ScriptedChatBackend::new().then_error(ErrorKind::Config, "401 invalid key");
        let (collected, _) = agent(chat, AgentConfig::default());
        let err = collected
            .stream(vec![ModelMessage::user("x")])
            .unwrap()
            .into_text()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m == "401 invalid key"));
    }

    #[tokio::test]
    async fn test_provider_is_not_retried() {
        let chat = ScriptedChatBackend::new()
            .then_failure("rate limited")
            .then_text("never sent");
        let (agent, _) = agent(chat.clone(), AgentConfig::default());

        let err = agent
            .stream(vec![ModelMessage::user("x")])
            .unwrap()
            .into_text()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(chat.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_partial_output() {
        let chat = ScriptedChatBackend::new()
            .then_text("one two three four")
            .with_event_delay(Duration::from_millis(40));
        let (agent, _) = agent(chat, AgentConfig::default().with_timeout_ms(100));

        let output = agent
            .stream(vec![ModelMessage::user("x")])
            .unwrap()
            .collect_output()
            .await;

        assert_eq!(output.finish_reason, FinishReason::Timeout);
        assert_eq!(output.text, "one two ");
        assert!(output.error.is_none());
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_before_model_call() {
        let chat = ScriptedChatBackend::new().then_text("unused");
        let (agent, _) = agent(chat.clone(), AgentConfig::default());
        let err = agent.stream(vec![]).err().unwrap();
        assert!(err.is_client_error());
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = Agent::with_tools(
            AgentConfig::default().with_max_steps(0),
            Arc::new(ScriptedChatBackend::new()),
            vec![],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
