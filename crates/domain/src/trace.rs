use serde::Serialize;

/// Structured trace events emitted across the relay adapter crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ThreadOpened {
        room: String,
        token: String,
        duration_secs: u64,
    },
    ThreadRefreshed {
        room: String,
        token: String,
        duration_secs: u64,
    },
    ThreadClosed {
        room: String,
    },
    ThreadExpired {
        room: String,
        token: String,
    },
    HookRegistered {
        hook_id: String,
        room: String,
        skill: String,
    },
    HookDelivered {
        hook_id: String,
        room: String,
        removed: bool,
    },
    HookRemoved {
        hook_id: String,
        room: String,
    },
    MessageRouted {
        room: String,
        route: String,
    },
    BrainConnected {
        url: String,
        brain_version: String,
    },
    BrainDisconnected {
        url: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ra_event");
    }
}
