//! Connection supervisor for the brain link.
//!
//! One supervisor task owns the WebSocket: it connects, performs the
//! `adapter_hello` / `brain_welcome` handshake, pumps frames, and reconnects
//! with back-off when the link drops. Callers talk to it through
//! [`BrainClient`], which correlates requests with replies by `request_id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use ra_domain::texts;
use ra_domain::trace::TraceEvent;
use ra_domain::BrainReply;
use ra_protocol::{AdapterInfo, Frame, Operation, PROTOCOL_VERSION};

use crate::reconnect::ReconnectBackoff;
use crate::types::{BrainError, BrainEvent, LinkState, ReplyBody};
use crate::BrainLink;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the brain lives and how we authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub token: Option<String>,
}

struct PendingRequest {
    op: &'static str,
    tx: oneshot::Sender<ReplyBody>,
}

struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub(crate) struct Parts {
    pub endpoint: Endpoint,
    pub adapter_id: String,
    pub version: String,
    pub platform: String,
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    pub welcome_timeout: Duration,
    pub backoff: ReconnectBackoff,
    pub events: mpsc::Sender<BrainEvent>,
}

struct Inner {
    endpoint: RwLock<Endpoint>,
    adapter: AdapterInfo,
    heartbeat_interval: Duration,
    request_timeout: Duration,
    welcome_timeout: Duration,
    backoff: ReconnectBackoff,
    state: RwLock<LinkState>,
    /// Sender into the live connection's writer task.
    outbound: RwLock<Option<mpsc::Sender<Frame>>>,
    /// request_id → waiting caller.
    pending: Mutex<HashMap<String, PendingRequest>>,
    events: mpsc::Sender<BrainEvent>,
    supervisor: Mutex<Option<Supervisor>>,
    /// Cuts a back-off wait short.
    wake: Notify,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BrainClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to the brain connection. Cheap to clone.
///
/// Create via [`BrainClientBuilder`](crate::builder::BrainClientBuilder).
#[derive(Clone)]
pub struct BrainClient {
    inner: Arc<Inner>,
}

impl BrainClient {
    pub fn builder() -> crate::builder::BrainClientBuilder {
        crate::builder::BrainClientBuilder::new()
    }

    pub(crate) fn from_parts(parts: Parts) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: RwLock::new(parts.endpoint),
                adapter: AdapterInfo {
                    id: parts.adapter_id,
                    version: parts.version,
                    platform: parts.platform,
                },
                heartbeat_interval: parts.heartbeat_interval,
                request_timeout: parts.request_timeout,
                welcome_timeout: parts.welcome_timeout,
                backoff: parts.backoff,
                state: RwLock::new(LinkState::Idle),
                outbound: RwLock::new(None),
                pending: Mutex::new(HashMap::new()),
                events: parts.events,
                supervisor: Mutex::new(None),
                wake: Notify::new(),
            }),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the supervisor if it is not running. Returns immediately; the
    /// connection comes up in the background.
    pub fn open(&self) {
        let mut slot = self.inner.supervisor.lock();
        if let Some(sup) = slot.as_ref() {
            if !sup.task.is_finished() {
                return;
            }
        }

        let cancel = CancellationToken::new();
        let inner = self.inner.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { supervise(inner, task_cancel).await });
        *slot = Some(Supervisor { cancel, task });
    }

    /// Tear the link down and start over, e.g. after the endpoint changed.
    pub fn reopen(&self) {
        tracing::info!(url = %self.endpoint().url, "reopening brain connection");
        self.stop();
        self.open();
    }

    /// Stop the supervisor and fail every in-flight request.
    pub fn shutdown(&self) {
        self.stop();
    }

    /// Skip the current back-off wait, or restart a supervisor that gave up.
    pub fn reconnect_now(&self) {
        let running = self
            .inner
            .supervisor
            .lock()
            .as_ref()
            .is_some_and(|s| !s.task.is_finished());
        if running {
            self.inner.wake.notify_one();
        } else {
            self.open();
        }
    }

    fn stop(&self) {
        if let Some(sup) = self.inner.supervisor.lock().take() {
            sup.cancel.cancel();
            sup.task.abort();
        }
        self.inner.connection_dropped();
        self.inner.set_state(LinkState::Closed);
    }

    /// Replace URL and token. Takes effect on the next (re)connect.
    pub fn set_endpoint(&self, endpoint: Endpoint) {
        *self.inner.endpoint.write() = endpoint;
    }

    pub fn endpoint(&self) -> Endpoint {
        self.inner.endpoint.read().clone()
    }

    pub fn state(&self) -> LinkState {
        *self.inner.state.read()
    }

    /// A supervisor exists (the link was opened and not shut down).
    pub fn has_connection(&self) -> bool {
        self.inner.supervisor.lock().is_some()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Send one request and wait for the correlated reply.
    pub async fn request(&self, op: Operation) -> Result<ReplyBody, BrainError> {
        let op_name = op.name();
        let sink = match self.inner.outbound.read().clone() {
            Some(sink) if self.is_open() => sink,
            _ => return Err(BrainError::NotConnected),
        };

        let (request_id, frame) = Frame::request(op);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(
            request_id.clone(),
            PendingRequest { op: op_name, tx },
        );

        if sink.send(frame).await.is_err() {
            self.inner.pending.lock().remove(&request_id);
            return Err(BrainError::ConnectionLost);
        }

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(BrainError::ConnectionLost),
            Err(_) => {
                self.inner.pending.lock().remove(&request_id);
                Err(BrainError::Timeout {
                    op: op_name,
                    request_id,
                })
            }
        }
    }

    /// Tell the brain a hook delivery went nowhere. Not correlated.
    pub async fn reject_hook(&self, hook_id: &str, reason: &str) -> Result<(), BrainError> {
        let sink = self
            .inner
            .outbound
            .read()
            .clone()
            .ok_or(BrainError::NotConnected)?;
        sink.send(Frame::HookRejected {
            hook_id: hook_id.to_owned(),
            reason: reason.to_owned(),
        })
        .await
        .map_err(|_| BrainError::ConnectionLost)
    }

    async fn fail_soft(&self, op: Operation, empty: &str) -> BrainReply {
        let op_name = op.name();
        match self.request(op).await {
            Ok(body) => normalize_reply(op_name, body, empty),
            Err(e) => {
                tracing::error!(op = op_name, error = %e, "brain request failed");
                BrainReply::from(texts::TRANSPORT_ERROR)
            }
        }
    }

    async fn acknowledged(&self, op: Operation) -> Result<ReplyBody, BrainError> {
        let op_name = op.name();
        let body = self.request(op).await?;
        if !body.is_success() {
            return Err(BrainError::Rejected {
                op: op_name,
                message: body
                    .error
                    .clone()
                    .unwrap_or_else(|| "unsuccessful reply".into()),
            });
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl BrainLink for BrainClient {
    fn has_connection(&self) -> bool {
        BrainClient::has_connection(self)
    }

    fn is_open(&self) -> bool {
        BrainClient::is_open(self)
    }

    fn reconnect_now(&self) {
        BrainClient::reconnect_now(self)
    }

    async fn command(&self, text: &str, data: Value) -> BrainReply {
        let op = Operation::Command {
            text: text.to_owned(),
            data,
        };
        self.fail_soft(op, texts::EMPTY_COMMAND).await
    }

    async fn sentence(&self, text: &str, data: Value) -> BrainReply {
        let op = Operation::Nlp {
            text: text.to_owned(),
            data,
        };
        self.fail_soft(op, texts::EMPTY_SENTENCE).await
    }

    async fn converse(&self, token: &str, text: &str, data: Value) -> BrainReply {
        let op = Operation::Converse {
            token: token.to_owned(),
            text: text.to_owned(),
            data,
        };
        self.fail_soft(op, texts::EMPTY_CONVERSE).await
    }

    async fn accept_hook(&self, hook_id: &str) -> Result<(), BrainError> {
        self.acknowledged(Operation::HookAccept {
            hook_id: hook_id.to_owned(),
        })
        .await
        .map(|_| ())
    }

    async fn close_hook(&self, hook_id: &str, room: &str) -> Result<Option<String>, BrainError> {
        let body = self
            .acknowledged(Operation::CloseHook {
                hook_id: hook_id.to_owned(),
                room: room.to_owned(),
            })
            .await?;
        Ok(body.message_text().map(str::to_owned))
    }

    async fn reject_hook(&self, hook_id: &str, reason: &str) -> Result<(), BrainError> {
        BrainClient::reject_hook(self, hook_id, reason).await
    }
}

/// Turn a reply into what the user sees. Missing or false `success` and
/// unparseable messages become the server-error text; an empty message
/// becomes `empty`.
pub(crate) fn normalize_reply(op: &'static str, body: ReplyBody, empty: &str) -> BrainReply {
    if !body.is_success() {
        tracing::error!(
            op,
            success = ?body.success,
            error = ?body.error,
            "unsuccessful reply from brain"
        );
        return BrainReply::from(texts::SERVER_ERROR);
    }

    let message = match body.message {
        None | Some(Value::Null) => return BrainReply::from(empty),
        Some(Value::String(s)) if s.is_empty() => return BrainReply::from(empty),
        Some(message) => message,
    };

    match serde_json::from_value::<BrainReply>(message) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(op, error = %e, "malformed reply message from brain");
            BrainReply::from(texts::SERVER_ERROR)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Inner {
    fn set_state(&self, state: LinkState) {
        *self.state.write() = state;
    }

    /// Forget the live connection. Dropping the pending senders wakes every
    /// waiting request with `ConnectionLost`.
    fn connection_dropped(&self) {
        *self.outbound.write() = None;
        let dropped = std::mem::take(&mut *self.pending.lock());
        if !dropped.is_empty() {
            let ops: Vec<&str> = dropped.values().map(|p| p.op).collect();
            tracing::warn!(count = dropped.len(), ops = ?ops, "failing in-flight brain requests");
        }
    }

    fn resolve(&self, request_id: &str, body: ReplyBody) {
        match self.pending.lock().remove(request_id) {
            Some(pending) => {
                let _ = pending.tx.send(body);
            }
            None => {
                tracing::debug!(request_id = %request_id, "reply for unknown or expired request");
            }
        }
    }

    fn build_url(&self, base: &str) -> String {
        let sep = if base.contains('?') { "&" } else { "?" };
        format!("{base}{sep}adapter_id={}", self.adapter.id)
    }
}

/// Aborts the connection's helper tasks however the connection ends.
struct TaskGuard(Vec<JoinHandle<()>>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

async fn supervise(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        inner.set_state(LinkState::Connecting);
        let result = tokio::select! {
            r = connect_and_run(&inner) => r,
            _ = cancel.cancelled() => break,
        };

        inner.connection_dropped();
        inner.set_state(LinkState::Closed);
        let url = inner.endpoint.read().url.clone();

        let reason = match result {
            Ok(handshake_completed) => {
                // Only a completed handshake resets the back-off.
                if handshake_completed {
                    attempt = 0;
                }
                "connection closed".to_owned()
            }
            Err(e) => {
                tracing::warn!(url = %url, attempt, error = %e, "brain connection lost");
                e.to_string()
            }
        };
        TraceEvent::BrainDisconnected {
            url: url.clone(),
            reason: reason.clone(),
        }
        .emit();
        let _ = inner.events.try_send(BrainEvent::Disconnected { reason });

        if inner.backoff.should_give_up(attempt) {
            tracing::error!(url = %url, attempts = attempt, "max reconnect attempts exhausted");
            break;
        }

        let delay = inner.backoff.delay_for_attempt(attempt);
        tracing::info!(
            url = %url,
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "reconnecting to brain"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.wake.notified() => {
                tracing::debug!("reconnect requested, skipping back-off");
            }
            _ = cancel.cancelled() => break,
        }

        attempt += 1;
    }

    inner.set_state(LinkState::Closed);
}

/// Single connection lifecycle: connect → handshake → frame loop.
///
/// Returns `Ok(true)` once the handshake completed and the link later
/// closed cleanly.
async fn connect_and_run(inner: &Arc<Inner>) -> anyhow::Result<bool> {
    let endpoint = inner.endpoint.read().clone();
    let url = inner.build_url(&endpoint.url);
    tracing::info!(url = %endpoint.url, adapter_id = %inner.adapter.id, "connecting to brain");

    let (ws, _response) = tokio_tungstenite::connect_async(&url).await?;
    let (mut sink, mut stream) = ws.split();

    // ── Send adapter_hello ───────────────────────────────────────────
    let hello = Frame::AdapterHello {
        protocol_version: PROTOCOL_VERSION,
        adapter: inner.adapter.clone(),
        token: endpoint.token.clone(),
    };
    sink.send(Message::Text(serde_json::to_string(&hello)?))
        .await?;

    // ── Wait for brain_welcome ───────────────────────────────────────
    let welcome = tokio::time::timeout(inner.welcome_timeout, async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(Frame::BrainWelcome { brain_version, .. }) = serde_json::from_str(&text)
                {
                    return Ok(brain_version);
                }
            }
        }
        Err(anyhow::anyhow!("connection closed before brain_welcome"))
    })
    .await;

    let brain_version = match welcome {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => return Err(e),
        Err(_) => return Err(anyhow::anyhow!("brain_welcome timeout")),
    };

    // ── Writer + heartbeat ───────────────────────────────────────────
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let ping_tx = outbound_tx.clone();
    let ping_interval = inner.heartbeat_interval;
    let pinger = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if ping_tx.send(Frame::ping()).await.is_err() {
                break;
            }
        }
    });
    let _tasks = TaskGuard(vec![writer, pinger]);

    *inner.outbound.write() = Some(outbound_tx.clone());
    inner.set_state(LinkState::Open);
    tracing::info!(brain_version = %brain_version, "brain welcomed us");
    TraceEvent::BrainConnected {
        url: endpoint.url.clone(),
        brain_version: brain_version.clone(),
    }
    .emit();
    let _ = inner
        .events
        .try_send(BrainEvent::Connected { brain_version });

    // ── Reader loop ──────────────────────────────────────────────────
    while let Some(msg) = stream.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => {
                tracing::info!("brain closed connection");
                break;
            }
            _ => continue,
        };

        match serde_json::from_str::<Frame>(&text) {
            Ok(Frame::Reply {
                request_id,
                success,
                message,
                error,
            }) => {
                inner.resolve(
                    &request_id,
                    ReplyBody {
                        success,
                        message,
                        error,
                    },
                );
            }
            Ok(Frame::Hook { hook_id, message }) => {
                tracing::debug!(hook_id = %hook_id, "received hook");
                if inner
                    .events
                    .send(BrainEvent::Hook { hook_id, message })
                    .await
                    .is_err()
                {
                    tracing::warn!("hook event dropped, no listener");
                }
            }
            Ok(Frame::ForceCloseHook { hook_id }) => {
                tracing::debug!(hook_id = %hook_id, "brain forced hook close");
                if inner
                    .events
                    .send(BrainEvent::ForceCloseHook { hook_id })
                    .await
                    .is_err()
                {
                    tracing::warn!("force_close_hook event dropped, no listener");
                }
            }
            Ok(Frame::Ping { timestamp }) => {
                let _ = outbound_tx.send(Frame::Pong { timestamp }).await;
            }
            Ok(Frame::Pong { .. }) => {
                tracing::trace!("received pong");
            }
            Ok(other) => {
                tracing::debug!(frame = other.kind(), "ignoring frame");
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to parse frame");
            }
        }
    }

    Ok(true)
}
