//! Client-held conversation transcript.
//!
//! A conversation is created on the first message (with a locally generated
//! id) or restored from the session file. The server may assign its own id
//! through the stream's `conversation_id` event; see
//! [`crate::stream::StreamAssembler`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::error::ApiResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Rough token estimate: four characters per token, rounded up per message.
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum()
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Drop the local transcript and ask the server to forget its copy.
///
/// The local copy is removed even when the server call fails, so the user
/// is never left with a transcript they asked to delete.
pub async fn clear_conversation(client: &ApiClient) -> ApiResult<()> {
    client.session().set_conversation(None).await?;
    client.delete("/api/chat/clear").await?;
    info!("conversation cleared");
    Ok(())
}
