//! Chat queries, streaming and non-streaming.
//!
//! [`ChatSession::send`] is the whole "send message" flow of the chat page:
//! build the request body, attach the stored conversation id, stream the
//! answer into a [`ResponseSink`] (or fetch it in one piece), and append both
//! sides of the exchange to the persisted transcript.

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{decode_json, ApiClient};
use crate::config::ChatConfig;
use crate::conversation::{Conversation, Role};
use crate::error::{ApiError, ApiResult, ChatError};
use crate::stream::{consume_stream, ResponseSink};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Body of `POST /api/chat/query`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub use_rag: bool,
    pub model_parameters: ModelParameters,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_filters: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, config: &ChatConfig) -> Self {
        Self {
            message: message.into(),
            model: config.model.clone(),
            use_rag: config.use_rag,
            model_parameters: ModelParameters {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            stream: config.stream,
            metadata_filters: None,
            conversation_id: None,
        }
    }

    /// The same request with streaming disabled, used to retry after a
    /// stream timeout.
    pub fn without_stream(&self) -> Self {
        Self {
            stream: false,
            ..self.clone()
        }
    }
}

/// Parse a user-supplied metadata filter. Must be a JSON object; blank input
/// means no filter.
pub fn parse_metadata_filters(input: &str) -> ApiResult<Option<serde_json::Value>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<serde_json::Value>(input) {
        Ok(v @ serde_json::Value::Object(_)) => Ok(Some(v)),
        Ok(_) => Err(ApiError::Validation(
            "Metadata filters must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::Validation(format!(
            "Invalid JSON in metadata filters: {}",
            e
        ))),
    }
}

/// Non-streaming response body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    #[serde(alias = "answer")]
    pub response: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub conversation_id: String,
    pub sources: Vec<serde_json::Value>,
    pub streamed: bool,
}

pub struct ChatSession {
    client: ApiClient,
    stream_timeout: Duration,
}

impl ChatSession {
    pub fn new(client: ApiClient, stream_timeout: Duration) -> Self {
        Self {
            client,
            stream_timeout,
        }
    }

    /// The stored conversation, or a fresh one.
    pub async fn conversation(&self) -> Conversation {
        self.client
            .session()
            .conversation()
            .await
            .unwrap_or_default()
    }

    /// Send a message and wait for the full answer.
    pub async fn send(
        &self,
        request: ChatRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<ChatReply, ChatError> {
        self.send_until(request, sink, std::future::pending::<()>())
            .await
    }

    /// Like [`send`](Self::send), but gives up with [`ChatError::Cancelled`]
    /// as soon as `cancel` completes (e.g. Ctrl-C). Dropping the in-flight
    /// future aborts the HTTP request.
    ///
    /// A conversation id announced by the stream is kept even when the
    /// answer never completes, and the timeout retry carries it.
    pub async fn send_until<C>(
        &self,
        mut request: ChatRequest,
        sink: &mut dyn ResponseSink,
        cancel: C,
    ) -> Result<ChatReply, ChatError>
    where
        C: Future<Output = ()>,
    {
        if request.message.trim().is_empty() {
            return Err(ApiError::Validation("Message must not be empty".into()).into());
        }

        let mut conversation = self.conversation().await;
        if request.conversation_id.is_none() {
            request.conversation_id = Some(conversation.id.clone());
        }

        let mut capture = CaptureConversationId::new(sink);
        let outcome = tokio::select! {
            result = self.dispatch(&request, &mut capture) => Some(result),
            _ = cancel => None,
        };

        if let Some(server_id) = capture.server_id {
            if server_id != conversation.id {
                debug!(old = %conversation.id, new = %server_id, "adopting server conversation id");
                conversation.id = server_id.clone();
                request.conversation_id = Some(server_id);
                self.client
                    .session()
                    .set_conversation(Some(conversation.clone()))
                    .await?;
            }
        }

        let reply = match outcome {
            Some(Ok(reply)) => reply,
            None => {
                warn!("chat request cancelled");
                return Err(ChatError::Cancelled);
            }
            Some(Err(DispatchError::TimedOut)) => {
                warn!(secs = self.stream_timeout.as_secs(), "chat stream timed out");
                return Err(ChatError::Timeout {
                    secs: self.stream_timeout.as_secs(),
                    retry: Box::new(request.without_stream()),
                });
            }
            Some(Err(DispatchError::Chat(e))) => return Err(e),
        };

        if let Some(server_id) = &reply.conversation_id {
            if *server_id != conversation.id {
                debug!(old = %conversation.id, new = %server_id, "adopting server conversation id");
                conversation.id = server_id.clone();
            }
        }
        conversation.push(Role::User, request.message.clone());
        conversation.push(Role::Assistant, reply.text.clone());
        let conversation_id = conversation.id.clone();
        self.client
            .session()
            .set_conversation(Some(conversation))
            .await?;

        info!(chars = reply.text.len(), streamed = reply.streamed, "chat reply received");
        Ok(ChatReply {
            text: reply.text,
            conversation_id,
            sources: reply.sources,
            streamed: reply.streamed,
        })
    }

    async fn dispatch(
        &self,
        request: &ChatRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<RawReply, DispatchError> {
        if !request.stream {
            return self.query_once(request, sink).await.map_err(DispatchError::Chat);
        }
        match tokio::time::timeout(self.stream_timeout, self.query_stream(request, sink)).await {
            Ok(result) => result.map_err(DispatchError::Chat),
            Err(_) => Err(DispatchError::TimedOut),
        }
    }

    async fn query_once(
        &self,
        request: &ChatRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<RawReply, ChatError> {
        let resp: ChatResponse = self.client.post_json("/api/chat/query", request).await?;
        sink.on_complete(&resp.response);
        Ok(RawReply {
            text: resp.response,
            conversation_id: resp.conversation_id,
            sources: resp.sources,
            streamed: false,
        })
    }

    async fn query_stream(
        &self,
        request: &ChatRequest,
        sink: &mut dyn ResponseSink,
    ) -> Result<RawReply, ChatError> {
        let resp = self
            .client
            .send("/api/chat/query", |http, url| {
                http.post(url)
                    .header(ACCEPT, "text/event-stream")
                    .json(request)
            })
            .await?;

        let is_event_stream = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if !is_event_stream {
            // Server answered in one piece despite stream=true.
            debug!("server returned a non-streaming response");
            let body: ChatResponse = decode_json(resp).await?;
            sink.on_complete(&body.response);
            return Ok(RawReply {
                text: body.response,
                conversation_id: body.conversation_id,
                sources: body.sources,
                streamed: false,
            });
        }

        let outcome = consume_stream(resp.bytes_stream(), sink).await?;
        Ok(RawReply {
            text: outcome.text,
            conversation_id: outcome.conversation_id,
            sources: Vec::new(),
            streamed: true,
        })
    }
}

struct RawReply {
    text: String,
    conversation_id: Option<String>,
    sources: Vec<serde_json::Value>,
    streamed: bool,
}

enum DispatchError {
    TimedOut,
    Chat(ChatError),
}

/// Forwards to the caller's sink and remembers the streamed conversation id,
/// which outlives the dispatch future if that is dropped on timeout or cancel.
struct CaptureConversationId<'a> {
    inner: &'a mut dyn ResponseSink,
    server_id: Option<String>,
}

impl<'a> CaptureConversationId<'a> {
    fn new(inner: &'a mut dyn ResponseSink) -> Self {
        Self {
            inner,
            server_id: None,
        }
    }
}

impl ResponseSink for CaptureConversationId<'_> {
    fn on_conversation_id(&mut self, id: &str) {
        if self.server_id.is_none() {
            self.server_id = Some(id.to_string());
        }
        self.inner.on_conversation_id(id);
    }

    fn on_update(&mut self, accumulated: &str, fragment: &str) {
        self.inner.on_update(accumulated, fragment);
    }

    fn on_complete(&mut self, text: &str) {
        self.inner.on_complete(text);
    }
}
