//! `ra-brain`: the relay adapter's link to the brain.
//!
//! The adapter keeps exactly one WebSocket to the brain. This crate owns
//! it: connection supervision and back-off, the handshake, heartbeat, and
//! the request/reply multiplexer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  request{op}   ┌──────────────┐   frames   ┌─────────┐
//! │  router      │ ─────────────► │ BrainClient  │ ─────────► │  brain  │
//! │  (gateway)   │ ◄───────────── │  supervisor  │ ◄───────── │         │
//! └──────────────┘  BrainReply    └──────┬───────┘            └─────────┘
//!                                        │ BrainEvent (hook, force_close_hook)
//!                                        ▼
//!                                  event receiver
//! ```
//!
//! # Connection flow
//!
//! 1. Connect WS (`?adapter_id=<id>`)
//! 2. Send `adapter_hello { protocol_version, adapter, token }`
//! 3. Wait for `brain_welcome { protocol_version, brain_version }`
//! 4. Main loop:
//!    - `reply`: wake the caller waiting on that `request_id`
//!    - `hook` / `force_close_hook`: forward as a [`BrainEvent`]
//!    - `ping`: answer `pong`; emit periodic `ping`s
//! 5. On disconnect: fail in-flight requests, reconnect with jittered
//!    exponential back-off

pub mod builder;
pub mod client;
pub mod reconnect;
pub mod types;

use serde_json::Value;

use ra_domain::BrainReply;

pub use builder::BrainClientBuilder;
pub use client::{BrainClient, Endpoint};
pub use reconnect::ReconnectBackoff;
pub use types::{BrainError, BrainEvent, LinkState, ReplyBody};

/// What the conversation router needs from the brain connection.
///
/// `command`, `sentence`, and `converse` are fail-soft: transport problems
/// come back as apology text, never as errors.
#[async_trait::async_trait]
pub trait BrainLink: Send + Sync {
    fn has_connection(&self) -> bool;
    fn is_open(&self) -> bool;
    /// Kick the connection; returns without waiting for it.
    fn reconnect_now(&self);

    async fn command(&self, text: &str, data: Value) -> BrainReply;
    async fn sentence(&self, text: &str, data: Value) -> BrainReply;
    async fn converse(&self, token: &str, text: &str, data: Value) -> BrainReply;

    async fn accept_hook(&self, hook_id: &str) -> Result<(), BrainError>;
    /// Returns the brain's acknowledgement text, if any.
    async fn close_hook(&self, hook_id: &str, room: &str) -> Result<Option<String>, BrainError>;
    /// Report a hook delivery that could not be handled.
    async fn reject_hook(&self, hook_id: &str, reason: &str) -> Result<(), BrainError>;
}
