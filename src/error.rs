//! Error types shared by every API module.
//!
//! Failures fall into a handful of user-visible categories: transport
//! problems (retry later), HTTP error statuses (show the server's `detail`),
//! authentication failures (credentials cleared, log in again), and client
//! side validation (the request was never sent).

use reqwest::StatusCode;
use thiserror::Error;

use crate::chat::ChatRequest;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection refused, DNS failure, reset, TLS error.
    #[error("could not reach the server: {0}")]
    Transport(String),

    #[error("the server did not respond in time")]
    Timeout,

    /// Non-success HTTP status with the message extracted from the body.
    #[error("{detail}")]
    Status { status: u16, detail: String },

    /// Refresh failed or a retried request was still unauthorized. Stored
    /// credentials have already been cleared.
    #[error("login required: {login_url}")]
    LoginRequired { login_url: String },

    /// Invalid user input, detected before anything was sent.
    #[error("{0}")]
    Validation(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("session storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Build an [`ApiError::Status`] from a status code and raw response body.
    ///
    /// Uses the JSON `detail` field when present (a string, or a list of
    /// validation errors whose `msg` fields are joined), otherwise a generic
    /// message.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::Status {
            status: status.as_u16(),
            detail: extract_detail(body)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16())),
        }
    }

    /// A short suggestion for the user, if the failure is one they can retry.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ApiError::Transport(_) => {
                Some("Check that the server is running and reachable, then try again.")
            }
            ApiError::Timeout => Some("The server may be busy. Try again in a moment."),
            ApiError::LoginRequired { .. } => Some("Run `ragchat login` to sign in again."),
            ApiError::Status { status, .. } if *status >= 500 => {
                Some("The server reported an internal error. Try again later.")
            }
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    match json.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(str::to_string)
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        other => Some(other.to_string()),
    }
}

/// Errors specific to a chat request.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The client-side stream timeout fired. `retry` holds the same request
    /// with streaming disabled, ready to resubmit.
    #[error("response timed out after {secs}s")]
    Timeout { secs: u64, retry: Box<ChatRequest> },

    #[error("request cancelled")]
    Cancelled,

    /// The server reported an error inside the event stream.
    #[error("stream error: {0}")]
    Stream(String),
}
