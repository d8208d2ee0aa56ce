use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions (threads)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle lifetime applied when an interactive reply carries no duration.
    #[serde(default = "d_idle")]
    pub default_idle_secs: u64,
    /// Process one message per room at a time. `false` lets concurrent
    /// messages for the same room race on the thread table.
    #[serde(default = "d_true")]
    pub serialize_rooms: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_idle_secs: d_idle(),
            serialize_rooms: true,
        }
    }
}

impl SessionsConfig {
    pub fn default_idle(&self) -> Duration {
        Duration::from_secs(self.default_idle_secs)
    }
}

fn d_idle() -> u64 {
    300
}
fn d_true() -> bool {
    true
}
