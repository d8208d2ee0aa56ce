use std::sync::Arc;

use ra_brain::BrainClient;
use ra_domain::config::Config;
use ra_sessions::{HookRegistry, SessionStore};
use ra_store::Database;

use crate::admin::AdminConsole;
use crate::blocklist::BlockList;
use crate::router::ConversationRouter;
use crate::settings::SettingsStore;

/// Everything wired at boot, shared by the CLI commands.
///
/// Fields are grouped by concern:
/// - **Core**: config, storage, brain link
/// - **Conversation**: threads, hooks, router
/// - **Administration**: settings, block-lists, admin console
#[derive(Clone)]
pub struct AdapterState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub db: Arc<dyn Database>,
    pub brain: BrainClient,

    // ── Conversation ──────────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub hooks: Arc<HookRegistry>,
    pub router: Arc<ConversationRouter>,

    // ── Administration ────────────────────────────────────────────────
    pub settings: Arc<SettingsStore>,
    /// `None` when `management.block_commands` is off.
    pub blocked_commands: Option<Arc<BlockList>>,
    /// `None` when `management.block_rooms` is off.
    pub blocked_rooms: Option<Arc<BlockList>>,
    pub admin: Arc<AdminConsole>,
}
