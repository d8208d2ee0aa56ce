use serde::{Deserialize, Serialize};

/// Optional moderation features exposed through admin commands.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ManagementConfig {
    /// Enable the command block-list (`block-commands ...`).
    #[serde(default)]
    pub block_commands: bool,
    /// Enable the room block-list (`block-rooms ...`).
    #[serde(default)]
    pub block_rooms: bool,
}
