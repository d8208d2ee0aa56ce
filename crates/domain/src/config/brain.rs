use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Brain connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    /// WebSocket endpoint of the brain.
    #[serde(default = "d_url")]
    pub url: String,
    /// Literal token. Prefer `token_env` outside local development.
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the brain token. Takes precedence over
    /// `token` when set and non-empty.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// Identifier announced in `adapter_hello`.
    #[serde(default = "d_adapter_id")]
    pub adapter_id: String,
    #[serde(default = "d_30")]
    pub request_timeout_secs: u64,
    #[serde(default = "d_30")]
    pub heartbeat_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            url: d_url(),
            token: None,
            token_env: d_token_env(),
            adapter_id: d_adapter_id(),
            request_timeout_secs: 30,
            heartbeat_secs: 30,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl BrainConfig {
    /// Resolve the token: environment first, then the literal value.
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone().filter(|t| !t.is_empty()))
    }
}

/// Jittered exponential back-off between reconnect attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "d_1000")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_60000")]
    pub max_delay_ms: u64,
    #[serde(default = "d_factor")]
    pub backoff_factor: f64,
    /// `0` retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
            max_attempts: 0,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_url() -> String {
    "ws://127.0.0.1:4100/v1/adapters/ws".into()
}
fn d_token_env() -> String {
    "RA_BRAIN_TOKEN".into()
}
fn d_adapter_id() -> String {
    "relay-adapter".into()
}
fn d_30() -> u64 {
    30
}
fn d_1000() -> u64 {
    1_000
}
fn d_60000() -> u64 {
    60_000
}
fn d_factor() -> f64 {
    2.0
}
