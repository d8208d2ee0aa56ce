//! Shared types for the relay adapter: configuration, errors, structured
//! trace events, and the message shapes exchanged between chat platforms,
//! the router, and the brain.

pub mod config;
pub mod error;
pub mod message;
pub mod texts;
pub mod trace;

pub use error::{Error, Result};
pub use message::{
    BrainReply, HookMessage, HookRequest, InboundMessage, MessageKind, OutgoingAction, ReplyMeta,
    StructuredReply, ThreadInfo,
};
