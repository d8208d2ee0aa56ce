//! Brain-pushed events: hook deliveries and forced hook closures.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ra_brain::{BrainEvent, BrainLink};
use ra_domain::{HookMessage, OutgoingAction, StructuredReply};
use ra_protocol::NO_HOOK;
use ra_sessions::{BoxError, HookCloseNotifier, HookRegistry, StoredHook};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Platform side
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Posts a message into a chat room.
#[async_trait::async_trait]
pub trait PlatformSink: Send + Sync {
    async fn send_message(&self, room: &str, action: OutgoingAction) -> Result<(), BoxError>;
}

/// What the platform should post for a hook message.
pub fn hook_action(message: HookMessage) -> OutgoingAction {
    if message.extra.is_empty() {
        OutgoingAction::text(message.text)
    } else {
        OutgoingAction::Structured(StructuredReply {
            text: message.text,
            extra: message.extra,
            ..Default::default()
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Close notifications
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tells the brain about every hook the registry removes.
///
/// The `close_hook` round trip runs on its own task. Its reply comes back
/// through the same reader that feeds [`EventPump`], so awaiting it from
/// the pump could stall both once the event channel fills.
pub struct BrainCloseNotifier {
    brain: Arc<dyn BrainLink>,
}

impl BrainCloseNotifier {
    pub fn new(brain: Arc<dyn BrainLink>) -> Self {
        Self { brain }
    }
}

#[async_trait::async_trait]
impl HookCloseNotifier for BrainCloseNotifier {
    async fn hook_closed(&self, hook: &StoredHook) -> Result<(), BoxError> {
        if !self.brain.is_open() {
            tracing::error!(
                hook_id = %hook.hook_id,
                "hook closed while the brain link is down"
            );
        }
        let brain = self.brain.clone();
        let hook = hook.clone();
        tokio::spawn(async move {
            match brain.close_hook(&hook.hook_id, &hook.room).await {
                Ok(ack) => {
                    tracing::debug!(hook_id = %hook.hook_id, "brain confirmed hook close");
                    if let Some(text) = ack.filter(|t| !t.is_empty()) {
                        tracing::info!(room = %hook.room, message = %text, "brain close acknowledgement");
                    }
                }
                Err(e) => {
                    tracing::warn!(hook_id = %hook.hook_id, error = %e, "hook close notification failed");
                }
            }
        });
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event pump
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EventPump {
    hooks: Arc<HookRegistry>,
    brain: Arc<dyn BrainLink>,
    sink: Arc<dyn PlatformSink>,
}

impl EventPump {
    pub fn new(
        hooks: Arc<HookRegistry>,
        brain: Arc<dyn BrainLink>,
        sink: Arc<dyn PlatformSink>,
    ) -> Self {
        Self { hooks, brain, sink }
    }

    /// Drain `events` until the channel closes or `cancel` fires.
    pub async fn run(self, mut events: mpsc::Receiver<BrainEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        tracing::debug!("brain event pump stopped");
    }

    pub async fn handle(&self, event: BrainEvent) {
        match event {
            BrainEvent::Hook { hook_id, message } => self.deliver(&hook_id, message).await,
            BrainEvent::ForceCloseHook { hook_id } => {
                tracing::info!(hook_id = %hook_id, "brain forced hook close");
                if let Err(e) = self.hooks.remove(&hook_id).await {
                    tracing::error!(hook_id = %hook_id, error = %e, "forced hook close failed");
                }
            }
            BrainEvent::Connected { brain_version } => {
                tracing::info!(brain_version = %brain_version, "brain link up");
            }
            BrainEvent::Disconnected { reason } => {
                tracing::warn!(reason = %reason, "brain link down");
            }
        }
    }

    async fn deliver(&self, hook_id: &str, message: HookMessage) {
        tracing::debug!(hook_id, "hook message received");
        let delivery = match self.hooks.deliver(hook_id, message).await {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(hook_id, error = %e, "hook delivery failed");
                if let Err(e) = self.brain.reject_hook(hook_id, NO_HOOK).await {
                    tracing::warn!(hook_id, error = %e, "could not report hook rejection");
                }
                return;
            }
        };

        let room = delivery.room.clone();
        if let Err(e) = self
            .sink
            .send_message(&room, hook_action(delivery.message))
            .await
        {
            tracing::error!(hook_id, room = %room, error = %e, "posting hook message failed");
        }
    }
}
