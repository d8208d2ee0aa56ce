//! Builder pattern for constructing a [`BrainClient`].

use std::time::Duration;

use tokio::sync::mpsc;

use ra_domain::config::BrainConfig;

use crate::client::{BrainClient, Endpoint};
use crate::reconnect::ReconnectBackoff;
use crate::types::{BrainError, BrainEvent};

/// Fluent builder for [`BrainClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use ra_brain::BrainClientBuilder;
/// # async fn demo() {
/// let (client, mut events) = BrainClientBuilder::new()
///     .url("ws://localhost:4100/v1/adapters/ws")
///     .token("secret")
///     .adapter_id("rocketchat-prod")
///     .request_timeout(std::time::Duration::from_secs(10))
///     .build()
///     .unwrap();
/// client.open();
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # }
/// ```
pub struct BrainClientBuilder {
    url: String,
    token: Option<String>,
    adapter_id: String,
    version: String,
    platform: String,
    heartbeat_interval: Duration,
    request_timeout: Duration,
    welcome_timeout: Duration,
    reconnect_backoff: ReconnectBackoff,
    event_buffer: usize,
}

impl BrainClientBuilder {
    pub fn new() -> Self {
        Self {
            url: String::new(),
            token: None,
            adapter_id: "relay-adapter".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            platform: "generic".into(),
            heartbeat_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            welcome_timeout: Duration::from_secs(10),
            reconnect_backoff: ReconnectBackoff::default(),
            event_buffer: 64,
        }
    }

    /// Seed every field from the `[brain]` config section.
    pub fn from_config(cfg: &BrainConfig) -> Self {
        let mut builder = Self::new()
            .url(cfg.url.clone())
            .adapter_id(cfg.adapter_id.clone())
            .heartbeat_interval(Duration::from_secs(cfg.heartbeat_secs))
            .request_timeout(Duration::from_secs(cfg.request_timeout_secs))
            .reconnect_backoff(ReconnectBackoff::from(&cfg.reconnect));
        builder.token = cfg.resolve_token();
        builder
    }

    // ── Endpoint ─────────────────────────────────────────────────────

    /// Brain WebSocket URL (e.g. `wss://brain.example.com/v1/adapters/ws`).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Token sent in `adapter_hello`.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn adapter_id(mut self, id: impl Into<String>) -> Self {
        self.adapter_id = id.into();
        self
    }

    pub fn version(mut self, v: impl Into<String>) -> Self {
        self.version = v.into();
        self
    }

    /// Chat platform the adapter fronts, reported to the brain.
    pub fn platform(mut self, p: impl Into<String>) -> Self {
        self.platform = p.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// How long a correlated request waits for its reply.
    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = d;
        self
    }

    pub fn welcome_timeout(mut self, d: Duration) -> Self {
        self.welcome_timeout = d;
        self
    }

    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Capacity of the event channel returned by [`build`](Self::build).
    pub fn event_buffer(mut self, n: usize) -> Self {
        self.event_buffer = n;
        self
    }

    /// Build the client and the receiver for brain-pushed events.
    pub fn build(self) -> Result<(BrainClient, mpsc::Receiver<BrainEvent>), BrainError> {
        if self.url.is_empty() {
            return Err(BrainError::Config("brain url is required".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(BrainError::Config("request timeout must be non-zero".into()));
        }

        let (events_tx, events_rx) = mpsc::channel(self.event_buffer.max(1));
        let client = BrainClient::from_parts(crate::client::Parts {
            endpoint: Endpoint {
                url: self.url,
                token: self.token,
            },
            adapter_id: self.adapter_id,
            version: self.version,
            platform: self.platform,
            heartbeat_interval: self.heartbeat_interval,
            request_timeout: self.request_timeout,
            welcome_timeout: self.welcome_timeout,
            backoff: self.reconnect_backoff,
            events: events_tx,
        });
        Ok((client, events_rx))
    }
}

impl Default for BrainClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
