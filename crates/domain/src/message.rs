//! Message shapes: what chat connectors hand us, what the brain answers,
//! and what we hand back to the platform.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message received from a chat platform.
///
/// `kind` is kept as the raw declared string so an unknown type can be
/// reported verbatim by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub room: String,
    pub username: String,
    /// Connector-specific extras, forwarded to the brain untouched.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl InboundMessage {
    pub fn new(
        kind: impl Into<String>,
        text: impl Into<String>,
        room: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            room: room.into(),
            username: username.into(),
            data: Map::new(),
        }
    }

    /// The payload forwarded with every brain request: connector data plus
    /// the originating room and user.
    pub fn brain_data(&self) -> Value {
        let mut data = self.data.clone();
        data.insert("channel".into(), Value::String(self.room.clone()));
        data.insert("user_name".into(), Value::String(self.username.clone()));
        Value::Object(data)
    }
}

/// The message types the router knows how to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Admin,
    Command,
    Sentence,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Command => "command",
            Self::Sentence => "sentence",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "command" => Ok(Self::Command),
            "sentence" => Ok(Self::Sentence),
            other => Err(other.to_owned()),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Brain replies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a skill answered: either bare text or a structured reply that may
/// open a thread or request a hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrainReply {
    Text(String),
    Structured(StructuredReply),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredReply {
    #[serde(default)]
    pub text: String,
    /// `true` keeps (or opens) a thread in the room.
    #[serde(default)]
    pub interactive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadInfo>,
    #[serde(default)]
    pub request_hook: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookRequest>,
    /// Platform-specific fields (attachments, formatting hints, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Thread identity as announced by the brain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: String,
    /// Idle lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// A hook the brain wants registered for the current room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRequest {
    pub id: String,
    #[serde(default)]
    pub skill: String,
    /// Recorded with the hook. Teardown follows a message's `delete_hook`.
    #[serde(default)]
    pub delete_on_deliver: bool,
}

/// Thread bookkeeping extracted from a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyMeta {
    pub conversation_token: Option<String>,
    pub interactive: bool,
    pub duration: Option<Duration>,
}

impl BrainReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(t) => t,
            Self::Structured(s) => &s.text,
        }
    }

    /// Bare text never keeps a thread open.
    pub fn meta(&self) -> ReplyMeta {
        match self {
            Self::Text(_) => ReplyMeta::default(),
            Self::Structured(s) => ReplyMeta {
                conversation_token: s.thread.as_ref().map(|t| t.id.clone()),
                interactive: s.interactive,
                duration: s
                    .thread
                    .as_ref()
                    .and_then(|t| t.duration)
                    .map(Duration::from_secs),
            },
        }
    }

    /// `Some` only when the reply both asks for a hook and describes one.
    pub fn hook_request(&self) -> Option<&HookRequest> {
        match self {
            Self::Structured(s) if s.request_hook => s.hook.as_ref(),
            _ => None,
        }
    }

    pub fn requests_hook(&self) -> bool {
        matches!(self, Self::Structured(s) if s.request_hook)
    }

    pub fn into_action(self) -> OutgoingAction {
        match self {
            Self::Text(text) => OutgoingAction::Text { text },
            Self::Structured(s) => OutgoingAction::Structured(s),
        }
    }
}

impl From<&str> for BrainReply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hook deliveries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A message pushed by the brain through a hook.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HookMessage {
    #[serde(default)]
    pub text: String,
    /// Close the hook once this message is delivered.
    #[serde(default)]
    pub delete_hook: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outgoing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the connector should post in response to an inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingAction {
    Text { text: String },
    /// Only visible to `recipient`.
    Private { text: String, recipient: String },
    Structured(StructuredReply),
}

impl OutgoingAction {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn private(text: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self::Private {
            text: text.into(),
            recipient: recipient.into(),
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Text { text } | Self::Private { text, .. } => text,
            Self::Structured(s) => &s.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_reply_parses_as_text() {
        let reply: BrainReply = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(reply, BrainReply::Text("hello".into()));
        assert_eq!(reply.meta(), ReplyMeta::default());
    }

    #[test]
    fn structured_reply_exposes_thread_meta() {
        let reply: BrainReply = serde_json::from_value(serde_json::json!({
            "text": "which size?",
            "interactive": true,
            "thread": { "id": "t-1", "duration": 90 },
            "buttons": ["S", "M"]
        }))
        .unwrap();

        let meta = reply.meta();
        assert!(meta.interactive);
        assert_eq!(meta.conversation_token.as_deref(), Some("t-1"));
        assert_eq!(meta.duration, Some(Duration::from_secs(90)));

        let BrainReply::Structured(s) = &reply else {
            panic!("expected structured reply");
        };
        assert_eq!(s.extra.get("buttons"), Some(&serde_json::json!(["S", "M"])));
    }

    #[test]
    fn hook_request_requires_flag_and_body() {
        let with_flag: BrainReply = serde_json::from_value(serde_json::json!({
            "text": "watching",
            "request_hook": true,
            "hook": { "id": "h1", "skill": "deploy" }
        }))
        .unwrap();
        assert_eq!(with_flag.hook_request().map(|h| h.id.as_str()), Some("h1"));

        let without_flag: BrainReply = serde_json::from_value(serde_json::json!({
            "text": "watching",
            "hook": { "id": "h1", "skill": "deploy" }
        }))
        .unwrap();
        assert!(without_flag.hook_request().is_none());
        assert!(!without_flag.requests_hook());
    }

    #[test]
    fn message_kind_rejects_unknown_types() {
        assert_eq!("command".parse::<MessageKind>(), Ok(MessageKind::Command));
        assert_eq!("image".parse::<MessageKind>(), Err("image".to_string()));
    }

    #[test]
    fn brain_data_carries_room_and_user() {
        let mut msg = InboundMessage::new("sentence", "hi", "general", "alice");
        msg.data.insert("locale".into(), Value::String("fr".into()));

        let data = msg.brain_data();
        assert_eq!(data["channel"], "general");
        assert_eq!(data["user_name"], "alice");
        assert_eq!(data["locale"], "fr");
    }

    #[test]
    fn outgoing_action_is_tagged() {
        let json = serde_json::to_value(OutgoingAction::private("nope", "bob")).unwrap();
        assert_eq!(json["type"], "private");
        assert_eq!(json["recipient"], "bob");
    }
}
