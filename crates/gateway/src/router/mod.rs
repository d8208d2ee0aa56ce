//! Conversation router: decides what an inbound message becomes.
//!
//! ```text
//! admin? ──► AdminConsole
//! room blocked? ──► drop
//! no connection / not open ──► fixed notice
//! open thread? ──► converse
//! command (not blocked) ──► command
//! sentence ──► nlp
//! ```
//!
//! Every brain reply then feeds the room's thread state and, when it asks
//! for one, a hook registration.

pub mod room_lock;

use std::sync::Arc;

use ra_brain::BrainLink;
use ra_domain::texts;
use ra_domain::trace::TraceEvent;
use ra_domain::{BrainReply, InboundMessage, MessageKind, OutgoingAction};
use ra_sessions::{HookRegistry, SessionStore};

use crate::admin::AdminConsole;
use crate::blocklist::BlockList;

pub use room_lock::{RoomLockClosed, RoomLockMap};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Reply(OutgoingAction),
    /// Suppressed by policy; nothing is posted.
    Dropped(DropReason),
}

impl RouteOutcome {
    pub fn into_action(self) -> Option<OutgoingAction> {
        match self {
            Self::Reply(action) => Some(action),
            Self::Dropped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RoomBlocked,
    CommandBlocked,
}

#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("unrecognized message type {0:?}: only `sentence` and `command` are handled")]
    UnrecognizedMessageType(String),

    #[error(transparent)]
    RoomLock(#[from] RoomLockClosed),
}

/// Everything the router is wired to.
pub struct RouterParts {
    pub brain: Arc<dyn BrainLink>,
    pub sessions: Arc<SessionStore>,
    pub hooks: Arc<HookRegistry>,
    pub admin: Arc<AdminConsole>,
    pub blocked_commands: Option<Arc<BlockList>>,
    pub blocked_rooms: Option<Arc<BlockList>>,
    pub serialize_rooms: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConversationRouter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConversationRouter {
    brain: Arc<dyn BrainLink>,
    sessions: Arc<SessionStore>,
    hooks: Arc<HookRegistry>,
    admin: Arc<AdminConsole>,
    blocked_commands: Option<Arc<BlockList>>,
    blocked_rooms: Option<Arc<BlockList>>,
    room_locks: Option<RoomLockMap>,
}

impl ConversationRouter {
    pub fn new(parts: RouterParts) -> Self {
        Self {
            brain: parts.brain,
            sessions: parts.sessions,
            hooks: parts.hooks,
            admin: parts.admin,
            blocked_commands: parts.blocked_commands,
            blocked_rooms: parts.blocked_rooms,
            room_locks: parts.serialize_rooms.then(RoomLockMap::new),
        }
    }

    pub fn is_room_blocked(&self, room: &str) -> bool {
        self.blocked_rooms.as_ref().is_some_and(|l| l.contains(room))
    }

    pub fn is_command_blocked(&self, command: &str) -> bool {
        self.blocked_commands
            .as_ref()
            .is_some_and(|l| l.contains(command))
    }

    /// Route one inbound message to its outgoing action.
    pub async fn route(&self, msg: InboundMessage) -> Result<RouteOutcome, RouteError> {
        let kind = msg.kind.parse::<MessageKind>();

        if kind == Ok(MessageKind::Admin) {
            let action = self.admin.handle(&msg.username, &msg.text).await;
            routed(&msg.room, "admin");
            return Ok(RouteOutcome::Reply(action));
        }

        if self.is_room_blocked(&msg.room) {
            tracing::info!(room = %msg.room, "room is blocked, dropping message");
            return Ok(RouteOutcome::Dropped(DropReason::RoomBlocked));
        }

        if !self.brain.has_connection() {
            tracing::warn!(room = %msg.room, "no brain connection");
            return Ok(RouteOutcome::Reply(OutgoingAction::text(texts::DISCONNECTED)));
        }
        if !self.brain.is_open() {
            tracing::warn!(room = %msg.room, "brain connection not open, reconnecting");
            self.brain.reconnect_now();
            return Ok(RouteOutcome::Reply(OutgoingAction::text(texts::COULD_NOT_JOIN)));
        }

        match &self.room_locks {
            Some(locks) => {
                let permit = locks.acquire(&msg.room).await?;
                let outcome = self.dispatch(&msg, kind).await;
                drop(permit);
                locks.release_idle(&msg.room);
                outcome
            }
            None => self.dispatch(&msg, kind).await,
        }
    }

    async fn dispatch(
        &self,
        msg: &InboundMessage,
        kind: Result<MessageKind, String>,
    ) -> Result<RouteOutcome, RouteError> {
        let data = msg.brain_data();

        let (route, reply) = if let Some(token) = self.sessions.check_thread(&msg.room) {
            ("converse", self.brain.converse(&token, &msg.text, data).await)
        } else {
            match kind {
                Ok(MessageKind::Command) => {
                    let name = msg.text.split_whitespace().next().unwrap_or_default();
                    if self.is_command_blocked(name) {
                        tracing::info!(room = %msg.room, command = name, "command is blocked, dropping message");
                        return Ok(RouteOutcome::Dropped(DropReason::CommandBlocked));
                    }
                    ("command", self.brain.command(&msg.text, data).await)
                }
                Ok(MessageKind::Sentence) => ("nlp", self.brain.sentence(&msg.text, data).await),
                Ok(MessageKind::Admin) | Err(_) => {
                    return Err(RouteError::UnrecognizedMessageType(msg.kind.clone()));
                }
            }
        };

        self.sessions.handle_turn(&reply.meta(), &msg.room);
        let action = if reply.requests_hook() {
            self.register_hook(reply, &msg.room).await
        } else {
            reply.into_action()
        };

        routed(&msg.room, route);
        Ok(RouteOutcome::Reply(action))
    }

    /// Register the requested hook and acknowledge it; any failure replaces
    /// the skill's reply with the hook-failure text.
    async fn register_hook(&self, reply: BrainReply, room: &str) -> OutgoingAction {
        let Some(request) = reply.hook_request().cloned() else {
            tracing::error!(room, "reply requested a hook without describing one");
            return OutgoingAction::text(texts::HOOK_FAILED);
        };

        if let Err(e) = self.hooks.register(&request, room).await {
            tracing::error!(hook_id = %request.id, room, error = %e, "hook registration failed");
            return OutgoingAction::text(texts::HOOK_FAILED);
        }
        if let Err(e) = self.brain.accept_hook(&request.id).await {
            tracing::error!(hook_id = %request.id, room, error = %e, "hook acknowledgement failed");
            return OutgoingAction::text(texts::HOOK_FAILED);
        }

        reply.into_action()
    }
}

fn routed(room: &str, route: &str) {
    TraceEvent::MessageRouted {
        room: room.to_owned(),
        route: route.to_owned(),
    }
    .emit();
}
