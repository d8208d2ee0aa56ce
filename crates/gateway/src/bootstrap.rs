//! AdapterState construction and background-task spawning.
//!
//! Shared by `serve`, `chat`, and `hooks` so every command boots the same
//! wiring.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ra_brain::{BrainClientBuilder, BrainEvent, BrainLink, Endpoint};
use ra_domain::config::{Config, ConfigSeverity, StorageDriver};
use ra_sessions::{HookRegistry, SessionStore};
use ra_store::{Database, FileDatabase, MemoryDatabase};

use crate::admin::AdminConsole;
use crate::blocklist::{BlockList, BLOCKED_COMMANDS, BLOCKED_ROOMS};
use crate::events::{BrainCloseNotifier, EventPump, PlatformSink};
use crate::router::{ConversationRouter, RouterParts};
use crate::settings::{Settings, SettingsStore, SETTINGS_COLLECTION};
use crate::state::AdapterState;

pub const HOOKS_COLLECTION: &str = "hooks";

/// Validate config, initialise every subsystem and return the wired
/// [`AdapterState`] plus the brain's event receiver. The brain link is
/// not opened yet; see [`connect`].
pub async fn build_adapter_state(
    config: Arc<Config>,
) -> anyhow::Result<(AdapterState, mpsc::Receiver<BrainEvent>)> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let db: Arc<dyn Database> = match config.storage.driver {
        StorageDriver::File => Arc::new(
            FileDatabase::open(&config.storage.state_path).with_context(|| {
                format!("opening state directory {}", config.storage.state_path.display())
            })?,
        ),
        StorageDriver::Memory => {
            tracing::warn!("memory storage driver: hooks and settings will not survive a restart");
            Arc::new(MemoryDatabase::new())
        }
    };
    tracing::info!(driver = ?config.storage.driver, "storage ready");

    // ── Settings (brain endpoint + admins) ───────────────────────────
    let seed = Settings {
        brain_url: config.brain.url.clone(),
        token: config.brain.resolve_token(),
        admins: config.admin.admins.clone(),
    };
    let settings = Arc::new(
        SettingsStore::init(db.collection(SETTINGS_COLLECTION), seed)
            .await
            .context("loading settings")?,
    );
    tracing::info!(
        brain_url = %settings.brain_url(),
        admins = settings.admins().len(),
        "settings ready"
    );

    // ── Block-lists ──────────────────────────────────────────────────
    let blocked_commands = if config.management.block_commands {
        Some(Arc::new(BlockList::load(db.collection(BLOCKED_COMMANDS)).await))
    } else {
        None
    };
    let blocked_rooms = if config.management.block_rooms {
        Some(Arc::new(BlockList::load(db.collection(BLOCKED_ROOMS)).await))
    } else {
        None
    };
    tracing::info!(
        block_commands = blocked_commands.is_some(),
        block_rooms = blocked_rooms.is_some(),
        "management features"
    );

    // ── Brain client ─────────────────────────────────────────────────
    let (brain, events) = BrainClientBuilder::from_config(&config.brain)
        .build()
        .context("building brain client")?;
    brain.set_endpoint(Endpoint {
        url: settings.brain_url(),
        token: settings.token(),
    });
    let link: Arc<dyn BrainLink> = Arc::new(brain.clone());

    // ── Threads + hooks ──────────────────────────────────────────────
    let sessions = Arc::new(SessionStore::new(config.sessions.default_idle()));
    let hooks = Arc::new(HookRegistry::new(
        db.collection(HOOKS_COLLECTION),
        Arc::new(BrainCloseNotifier::new(link.clone())),
    ));
    let loaded = hooks.load().await;
    tracing::info!(hooks = loaded, "hook registry ready");

    // ── Router ───────────────────────────────────────────────────────
    let admin = Arc::new(AdminConsole::new(
        settings.clone(),
        Arc::new(brain.clone()),
        blocked_commands.clone(),
        blocked_rooms.clone(),
    ));
    let router = Arc::new(ConversationRouter::new(RouterParts {
        brain: link,
        sessions: sessions.clone(),
        hooks: hooks.clone(),
        admin: admin.clone(),
        blocked_commands: blocked_commands.clone(),
        blocked_rooms: blocked_rooms.clone(),
        serialize_rooms: config.sessions.serialize_rooms,
    }));
    tracing::info!(
        serialize_rooms = config.sessions.serialize_rooms,
        default_idle_secs = config.sessions.default_idle_secs,
        "conversation router ready"
    );

    let state = AdapterState {
        config,
        db,
        brain,
        sessions,
        hooks,
        router,
        settings,
        blocked_commands,
        blocked_rooms,
        admin,
    };
    Ok((state, events))
}

/// Open the brain link and start pumping its events into `sink`.
pub fn connect(
    state: &AdapterState,
    events: mpsc::Receiver<BrainEvent>,
    sink: Arc<dyn PlatformSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let pump = EventPump::new(
        state.hooks.clone(),
        Arc::new(state.brain.clone()),
        sink,
    );
    let handle = tokio::spawn(pump.run(events, cancel));

    state.brain.open();
    tracing::info!(url = %state.brain.endpoint().url, "brain link opening");
    handle
}
