//! Errors, events, and connection state shared by the client and its users.

use serde_json::Value;

use ra_domain::HookMessage;

/// Errors from the brain connection. Command, free-text, and continuation
/// requests never surface these; they degrade to apology text instead.
#[derive(thiserror::Error, Debug)]
pub enum BrainError {
    #[error("config: {0}")]
    Config(String),
    #[error("not connected to the brain")]
    NotConnected,
    #[error("{op} request {request_id} timed out")]
    Timeout {
        op: &'static str,
        request_id: String,
    },
    #[error("connection lost before the reply arrived")]
    ConnectionLost,
    #[error("brain rejected {op}: {message}")]
    Rejected { op: &'static str, message: String },
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Pushed by the brain outside any request/reply exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum BrainEvent {
    Hook {
        hook_id: String,
        message: HookMessage,
    },
    ForceCloseHook {
        hook_id: String,
    },
    Connected {
        brain_version: String,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// `open()` was never called.
    Idle,
    Connecting,
    Open,
    /// Dropped; the supervisor may be waiting out a back-off.
    Closed,
}

/// Payload of a `reply` frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyBody {
    pub success: Option<bool>,
    pub message: Option<Value>,
    pub error: Option<String>,
}

impl ReplyBody {
    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    /// The `message` field as text, when it is a string or carries `text`.
    pub fn message_text(&self) -> Option<&str> {
        match self.message.as_ref()? {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("text").and_then(Value::as_str),
            _ => None,
        }
    }
}
