//! Test doubles shared by the gateway's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use ra_brain::{BrainError, BrainLink};
use ra_domain::{BrainReply, OutgoingAction};
use ra_sessions::{BoxError, HookCloseNotifier, HookRegistry, StoredHook};
use ra_store::memory::MemoryCollection;

use crate::events::PlatformSink;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Command(String),
    Sentence(String),
    Converse { token: String, text: String },
    AcceptHook(String),
    CloseHook { hook_id: String, room: String },
    RejectHook { hook_id: String, reason: String },
    Reconnect,
}

/// Scripted brain: replies are popped in order, `"ok"` once exhausted.
pub struct FakeBrain {
    pub connected: AtomicBool,
    pub open: AtomicBool,
    pub accept_fails: AtomicBool,
    /// `close_hook` waits for `close_release` while set.
    pub hold_close: AtomicBool,
    pub close_release: tokio::sync::Notify,
    pub calls: Mutex<Vec<Call>>,
    pub replies: Mutex<VecDeque<BrainReply>>,
    pub data_seen: Mutex<Vec<Value>>,
    pub reconnects: AtomicUsize,
}

impl FakeBrain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            open: AtomicBool::new(true),
            accept_fails: AtomicBool::new(false),
            hold_close: AtomicBool::new(false),
            close_release: tokio::sync::Notify::new(),
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            data_seen: Mutex::new(Vec::new()),
            reconnects: AtomicUsize::new(0),
        })
    }

    pub fn push_reply(&self, reply: BrainReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn next_reply(&self, data: Value) -> BrainReply {
        self.data_seen.lock().push(data);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| BrainReply::from("ok"))
    }
}

#[async_trait::async_trait]
impl BrainLink for FakeBrain {
    fn has_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn reconnect_now(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(Call::Reconnect);
    }

    async fn command(&self, text: &str, data: Value) -> BrainReply {
        self.calls.lock().push(Call::Command(text.into()));
        self.next_reply(data)
    }

    async fn sentence(&self, text: &str, data: Value) -> BrainReply {
        self.calls.lock().push(Call::Sentence(text.into()));
        self.next_reply(data)
    }

    async fn converse(&self, token: &str, text: &str, data: Value) -> BrainReply {
        self.calls.lock().push(Call::Converse {
            token: token.into(),
            text: text.into(),
        });
        self.next_reply(data)
    }

    async fn accept_hook(&self, hook_id: &str) -> Result<(), BrainError> {
        self.calls.lock().push(Call::AcceptHook(hook_id.into()));
        if self.accept_fails.load(Ordering::SeqCst) {
            return Err(BrainError::NotConnected);
        }
        Ok(())
    }

    async fn close_hook(&self, hook_id: &str, room: &str) -> Result<Option<String>, BrainError> {
        self.calls.lock().push(Call::CloseHook {
            hook_id: hook_id.into(),
            room: room.into(),
        });
        if self.hold_close.load(Ordering::SeqCst) {
            self.close_release.notified().await;
        }
        Ok(Some("bye".into()))
    }

    async fn reject_hook(&self, hook_id: &str, reason: &str) -> Result<(), BrainError> {
        self.calls.lock().push(Call::RejectHook {
            hook_id: hook_id.into(),
            reason: reason.into(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct NullNotifier;

#[async_trait::async_trait]
impl HookCloseNotifier for NullNotifier {
    async fn hook_closed(&self, _hook: &StoredHook) -> Result<(), BoxError> {
        Ok(())
    }
}

pub fn memory_registry() -> Arc<HookRegistry> {
    Arc::new(HookRegistry::new(
        Arc::new(MemoryCollection::new("hooks")),
        Arc::new(NullNotifier),
    ))
}

/// Collects everything posted to the platform.
#[derive(Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(String, OutgoingAction)>>,
    pub fail: AtomicBool,
}

#[async_trait::async_trait]
impl PlatformSink for RecordingSink {
    async fn send_message(&self, room: &str, action: OutgoingAction) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("platform down".into());
        }
        self.sent.lock().push((room.to_owned(), action));
        Ok(())
    }
}

/// Let spawned tasks (close notifications) run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
