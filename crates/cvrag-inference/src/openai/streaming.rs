//! SSE stream parsing for OpenAI-compatible streaming chat responses.
//!
//! Network chunks do not align with SSE lines, so bytes are buffered until a
//! full line is available. Tool-call fragments are accumulated per index and
//! emitted once the provider signals the end of the turn.

use std::collections::BTreeMap;
use std::fmt::Display;

use futures::{Stream, StreamExt};
use tracing::trace;

use cvrag_core::{ChatEvent, ChatStream, Error, Result, ToolCall};

use super::types::ChatCompletionChunk;

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Incremental decoder for a `text/event-stream` chat completion body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes and return every event completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<ChatEvent>> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim(), &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Flush whatever remains once the byte stream has ended.
    ///
    /// A trailing line without a newline is still processed, and pending
    /// tool calls are emitted even if the provider never sent a finish reason.
    pub fn finish(&mut self) -> Vec<Result<ChatEvent>> {
        let mut events = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.handle_line(line.trim(), &mut events);
        }
        self.flush_tool_calls(&mut events);
        self.done = true;
        events
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<Result<ChatEvent>>) {
        // Blank separators and `:` keep-alive comments carry nothing.
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();

        if data == "[DONE]" {
            self.flush_tool_calls(events);
            self.done = true;
            return;
        }

        let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                events.push(Err(Error::Inference(format!(
                    "Failed to parse SSE chunk: {}",
                    e
                ))));
                return;
            }
        };

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(Ok(ChatEvent::TextDelta(content)));
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let partial = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    partial.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                trace!(finish_reason = %reason, "Chat stream choice finished");
                self.flush_tool_calls(events);
                events.push(Ok(ChatEvent::Finish(Some(reason))));
            }
        }
    }

    fn flush_tool_calls(&mut self, events: &mut Vec<Result<ChatEvent>>) {
        for (index, partial) in std::mem::take(&mut self.tool_calls) {
            events.push(Ok(ChatEvent::ToolCall(ToolCall {
                id: partial.id.unwrap_or_else(|| format!("call_{}", index)),
                name: partial.name,
                arguments: partial.arguments,
            })));
        }
    }
}

/// Turn a raw HTTP body stream into a stream of chat events.
pub fn parse_sse_stream<S, B, E>(stream: S) -> ChatStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = (stream, SseDecoder::new(), false);
    let events = futures::stream::unfold(state, |(mut stream, mut decoder, ended)| async move {
        if ended {
            return None;
        }
        let batch = match stream.next().await {
            Some(Ok(bytes)) => {
                let batch = decoder.feed(bytes.as_ref());
                let ended = decoder.is_done();
                return Some((batch, (stream, decoder, ended)));
            }
            Some(Err(e)) => vec![Err(Error::Inference(format!("Stream error: {}", e)))],
            None => decoder.finish(),
        };
        Some((batch, (stream, decoder, true)))
    })
    .flat_map(futures::stream::iter);

    Box::pin(events)
}
