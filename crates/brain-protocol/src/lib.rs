//! Brain protocol: the JSON frames exchanged between the relay adapter and
//! the brain over a single WebSocket.
//!
//! Every frame is a text message tagged by `type`. The adapter opens with
//! `adapter_hello`, the brain answers `brain_welcome`, then both sides may
//! send at any time:
//!
//! - adapter → brain: `request`, `hook_rejected`, `ping`/`pong`
//! - brain → adapter: `reply`, `hook`, `force_close_hook`, `ping`/`pong`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ra_domain::HookMessage;

/// Bumped on incompatible frame changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Reason sent with `hook_rejected` when a delivery names an unknown hook.
pub const NO_HOOK: &str = "NO_HOOK";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Adapter → Brain: first frame after connect.
    AdapterHello {
        protocol_version: u32,
        adapter: AdapterInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Brain → Adapter: handshake accepted.
    BrainWelcome {
        protocol_version: u32,
        brain_version: String,
    },

    /// Adapter → Brain: a correlated operation.
    Request { request_id: String, op: Operation },

    /// Brain → Adapter: answer to a `request` with the same `request_id`.
    Reply {
        request_id: String,
        /// Absent means the reply is malformed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        /// A bare string or a structured reply object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Brain → Adapter: push a message through a registered hook.
    Hook { hook_id: String, message: HookMessage },

    /// Adapter → Brain: a `hook` frame could not be delivered.
    HookRejected { hook_id: String, reason: String },

    /// Brain → Adapter: tear a hook down.
    ForceCloseHook { hook_id: String },

    Ping { timestamp: i64 },
    Pong { timestamp: i64 },
}

/// The operation carried by a `request` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Run a command (`/deploy prod`).
    Command { text: String, data: Value },
    /// Interpret free text.
    Nlp { text: String, data: Value },
    /// Continue the thread identified by `token`.
    Converse {
        token: String,
        text: String,
        data: Value,
    },
    /// The adapter stored the hook the brain asked for.
    HookAccept { hook_id: String },
    /// The adapter removed a hook.
    CloseHook { hook_id: String, room: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Nlp { .. } => "nlp",
            Self::Converse { .. } => "converse",
            Self::HookAccept { .. } => "hook_accept",
            Self::CloseHook { .. } => "close_hook",
        }
    }
}

/// Identity announced in `adapter_hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub id: String,
    pub version: String,
    /// Chat platform the adapter fronts (`stdio`, `rocketchat`, ...).
    #[serde(default)]
    pub platform: String,
}

impl Frame {
    pub fn request(op: Operation) -> (String, Self) {
        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = Self::Request {
            request_id: request_id.clone(),
            op,
        };
        (request_id, frame)
    }

    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdapterHello { .. } => "adapter_hello",
            Self::BrainWelcome { .. } => "brain_welcome",
            Self::Request { .. } => "request",
            Self::Reply { .. } => "reply",
            Self::Hook { .. } => "hook",
            Self::HookRejected { .. } => "hook_rejected",
            Self::ForceCloseHook { .. } => "force_close_hook",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
        }
    }
}
