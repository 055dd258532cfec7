//! Chat stream assembly.
//!
//! Turns decoded SSE events into a running response string:
//!
//! - `event: conversation_id` sets the conversation id once; repeats are
//!   ignored and never reach the text.
//! - `event: error` (or a JSON `{"error": …}` frame) aborts the stream.
//! - Anything else is a token fragment: the `chunk` field of a JSON
//!   envelope when there is one, otherwise the raw data, appended literally.
//!
//! [`consume_stream`] drives an assembler from a byte stream and reports
//! every step to a [`ResponseSink`], which re-renders the accumulated text
//! after each fragment and once more, fully, at the end.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::{ApiError, ChatError};
use crate::markdown::{self, RenderMode};
use crate::sse::{SseDecoder, SseEvent};

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// Text was appended.
    Fragment(String),
    /// The conversation id was set for the first time.
    ConversationId(String),
    /// Nothing visible changed.
    Skipped,
}

#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: SseDecoder,
    text: String,
    conversation_id: Option<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Feed raw bytes; returns the steps for every event they completed.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<Vec<StreamStep>, ChatError> {
        let events = self.decoder.push(bytes);
        events.into_iter().map(|e| self.apply(e)).collect()
    }

    /// Flush any unterminated trailing frame.
    pub fn finish(&mut self) -> Result<Option<StreamStep>, ChatError> {
        self.decoder.finish().map(|e| self.apply(e)).transpose()
    }

    pub fn apply(&mut self, event: SseEvent) -> Result<StreamStep, ChatError> {
        match event.event.as_deref() {
            Some("conversation_id") => Ok(self.set_conversation_id(&event.data)),
            Some("error") => Err(ChatError::Stream(error_message(&event.data))),
            _ => self.append_fragment(&event.data),
        }
    }

    fn set_conversation_id(&mut self, data: &str) -> StreamStep {
        if self.conversation_id.is_some() {
            return StreamStep::Skipped;
        }
        let id = match serde_json::from_str::<serde_json::Value>(data) {
            Ok(serde_json::Value::Object(map)) => map
                .get("conversation_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Ok(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
        .unwrap_or_else(|| data.trim().to_string());

        if id.is_empty() {
            return StreamStep::Skipped;
        }
        debug!(conversation_id = %id, "conversation id assigned by server");
        self.conversation_id = Some(id.clone());
        StreamStep::ConversationId(id)
    }

    fn append_fragment(&mut self, data: &str) -> Result<StreamStep, ChatError> {
        if data == "[DONE]" {
            return Ok(StreamStep::Skipped);
        }

        let fragment = match serde_json::from_str::<serde_json::Value>(data) {
            Ok(serde_json::Value::Object(map)) => {
                if let Some(chunk) = map.get("chunk").and_then(|c| c.as_str()) {
                    chunk.to_string()
                } else if let Some(err) = map.get("error").and_then(|e| e.as_str()) {
                    return Err(ChatError::Stream(err.to_string()));
                } else if map.get("done").and_then(|d| d.as_bool()) == Some(true) {
                    return Ok(StreamStep::Skipped);
                } else {
                    data.to_string()
                }
            }
            _ => data.to_string(),
        };

        if fragment.is_empty() {
            return Ok(StreamStep::Skipped);
        }
        self.text.push_str(&fragment);
        Ok(StreamStep::Fragment(fragment))
    }
}

fn error_message(data: &str) -> String {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("detail"))
                .and_then(|e| e.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| data.to_string())
}

/// Receives progress while a response streams in.
pub trait ResponseSink: Send {
    fn on_conversation_id(&mut self, _id: &str) {}

    /// Called after every appended fragment with the full text so far.
    fn on_update(&mut self, accumulated: &str, fragment: &str);

    /// Called exactly once with the final text.
    fn on_complete(&mut self, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub conversation_id: Option<String>,
}

/// Drive `body` to completion, reporting to `sink`.
pub async fn consume_stream<S>(
    body: S,
    sink: &mut dyn ResponseSink,
) -> Result<StreamOutcome, ChatError>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    let mut body = std::pin::pin!(body);
    let mut assembler = StreamAssembler::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(ApiError::from)?;
        for step in assembler.push_bytes(&chunk)? {
            report(&assembler, step, sink);
        }
    }
    if let Some(step) = assembler.finish()? {
        report(&assembler, step, sink);
    }

    sink.on_complete(assembler.text());
    Ok(StreamOutcome {
        text: assembler.text().to_string(),
        conversation_id: assembler.conversation_id().map(str::to_string),
    })
}

fn report(assembler: &StreamAssembler, step: StreamStep, sink: &mut dyn ResponseSink) {
    match step {
        StreamStep::Fragment(fragment) => sink.on_update(assembler.text(), &fragment),
        StreamStep::ConversationId(id) => sink.on_conversation_id(&id),
        StreamStep::Skipped => {}
    }
}

/// Sink that keeps an HTML rendering of the response current.
///
/// Incremental updates use the light markdown pass; completion runs the
/// full pass (fence repair, code-block decoration) once.
#[derive(Debug)]
pub struct HtmlTranscript {
    mode: RenderMode,
    html: String,
    renders: usize,
    complete: bool,
}

impl HtmlTranscript {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            html: String::new(),
            renders: 0,
            complete: false,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl ResponseSink for HtmlTranscript {
    fn on_update(&mut self, accumulated: &str, _fragment: &str) {
        self.html = markdown::render_incremental(accumulated, self.mode);
        self.renders += 1;
    }

    fn on_complete(&mut self, text: &str) {
        self.html = markdown::render(text, self.mode);
        self.renders += 1;
        self.complete = true;
    }
}
