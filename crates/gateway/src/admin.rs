//! Chat-level administrative commands (`admin`-type messages).
//!
//! Every reply is private to the requesting user. Commands:
//!
//! ```text
//! token [set <token>]
//! url [set <url>]
//! admin add|delete <user> | admin list
//! block-commands add|delete <name> | block-commands list
//! block-rooms add|delete <room> | block-rooms list
//! help
//! ```

use std::sync::Arc;

use ra_brain::{BrainClient, Endpoint};
use ra_domain::texts;
use ra_domain::OutgoingAction;
use ra_store::StorageError;

use crate::blocklist::BlockList;
use crate::settings::SettingsStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum AdminError {
    #[error("{0} is already an administrator")]
    AlreadyAdmin(String),

    #[error("{0} is not an administrator")]
    UnknownAdmin(String),

    #[error("cannot delete the last administrator")]
    LastAdmin,

    #[error("{0} is already blocked")]
    AlreadyBlocked(String),

    #[error("{0} is not blocked")]
    NotBlocked(String),

    #[error("persistence: {0}")]
    Persistence(#[from] StorageError),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Endpoint switching
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Applies a new brain endpoint and restarts the connection.
pub trait BrainEndpoint: Send + Sync {
    fn switch_endpoint(&self, url: &str, token: Option<&str>);
}

impl BrainEndpoint for BrainClient {
    fn switch_endpoint(&self, url: &str, token: Option<&str>) {
        self.set_endpoint(Endpoint {
            url: url.to_owned(),
            token: token.map(str::to_owned),
        });
        self.reopen();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AdminConsole
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AdminConsole {
    settings: Arc<SettingsStore>,
    brain: Arc<dyn BrainEndpoint>,
    /// `None` when the matching management feature is disabled.
    blocked_commands: Option<Arc<BlockList>>,
    blocked_rooms: Option<Arc<BlockList>>,
}

#[derive(Clone, Copy)]
enum ListKind {
    Commands,
    Rooms,
}

impl ListKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Commands => "block-commands",
            Self::Rooms => "block-rooms",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Self::Commands => "command",
            Self::Rooms => "room",
        }
    }
}

impl AdminConsole {
    pub fn new(
        settings: Arc<SettingsStore>,
        brain: Arc<dyn BrainEndpoint>,
        blocked_commands: Option<Arc<BlockList>>,
        blocked_rooms: Option<Arc<BlockList>>,
    ) -> Self {
        Self {
            settings,
            brain,
            blocked_commands,
            blocked_rooms,
        }
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.settings.is_admin(user)
    }

    /// Run one administrative command on behalf of `user`.
    pub async fn handle(&self, user: &str, text: &str) -> OutgoingAction {
        if !self.is_admin(user) {
            tracing::warn!(user, "administrative command from non-admin");
            return OutgoingAction::private(texts::NOT_ADMIN, user);
        }

        let args: Vec<&str> = text.split_whitespace().collect();
        tracing::debug!(user, command = args.first().copied().unwrap_or(""), "admin command");

        let reply = match args.as_slice() {
            ["token"] => self.show_token(),
            ["token", "set", token] => self.set_token(token).await,
            ["token", ..] => "Type `token set <token>` to set the brain token.".to_owned(),

            ["url"] => format!(
                "The current url is: `{}`\nYou should **delete** this message.",
                self.settings.brain_url()
            ),
            ["url", "set", url] => self.set_url(url).await,
            ["url", ..] => "Type `url set <url>` to set the brain url.".to_owned(),

            ["admin", rest @ ..] => self.admin(rest).await,
            ["block-commands", rest @ ..] => self.block_list(ListKind::Commands, rest).await,
            ["block-rooms", rest @ ..] => self.block_list(ListKind::Rooms, rest).await,

            ["help", ..] => self.help(),
            _ => "Unknown command. Type `help` to get the list of administrative commands."
                .to_owned(),
        };

        OutgoingAction::private(reply, user)
    }

    // ── Brain endpoint ───────────────────────────────────────────────

    fn show_token(&self) -> String {
        let token = self.settings.token().unwrap_or_default();
        format!("The current token is: `{token}`\nYou should **delete** this message.")
    }

    async fn set_token(&self, token: &str) -> String {
        if let Err(e) = self.settings.set_token(token).await {
            tracing::error!(error = %e, "could not persist brain token");
            return format!("Couldn't update the token: {e}");
        }
        self.brain
            .switch_endpoint(&self.settings.brain_url(), Some(token));
        format!("The new token is: `{token}`\nYou should **delete** this message.")
    }

    async fn set_url(&self, url: &str) -> String {
        if let Err(e) = self.settings.set_brain_url(url).await {
            tracing::error!(error = %e, "could not persist brain url");
            return format!("Couldn't update the url: {e}");
        }
        self.brain
            .switch_endpoint(url, self.settings.token().as_deref());
        format!("The new url is: `{url}`\nYou should **delete** this message.")
    }

    // ── Admin list ───────────────────────────────────────────────────

    async fn admin(&self, args: &[&str]) -> String {
        match args {
            ["add", user] => match self.settings.add_admin(user).await {
                Ok(()) => format!("User {user} added to the administrators."),
                Err(e) => format!("Couldn't add {user} to the administrators: {e}."),
            },
            ["delete", user] => match self.settings.remove_admin(user).await {
                Ok(()) => format!("User {user} deleted from the administrators."),
                Err(e) => format!("Couldn't delete {user} from the administrators: {e}."),
            },
            ["add" | "delete"] => "Missing user name.".to_owned(),
            ["list"] => bullet_list("Administrators:", &self.settings.admins()),
            _ => "I didn't understand that command. Type `help` for the list of commands."
                .to_owned(),
        }
    }

    // ── Block-lists ──────────────────────────────────────────────────

    async fn block_list(&self, kind: ListKind, args: &[&str]) -> String {
        let list = match kind {
            ListKind::Commands => self.blocked_commands.as_ref(),
            ListKind::Rooms => self.blocked_rooms.as_ref(),
        };
        let Some(list) = list else {
            return "disabled".to_owned();
        };
        let noun = kind.noun();

        match args {
            ["add", name] => match list.add(name).await {
                Ok(()) => format!("The {noun} {name} is now blocked."),
                Err(e) => format!("Couldn't block {name}: {e}."),
            },
            ["delete", name] => match list.remove(name).await {
                Ok(()) => format!("The {noun} {name} is no longer blocked."),
                Err(e) => format!("Couldn't unblock {name}: {e}."),
            },
            ["add" | "delete"] => format!("Missing {noun} name."),
            ["list"] => bullet_list(&format!("Blocked {noun}s:"), &list.list()),
            _ => format!(
                "Type `{} add|delete <{noun}>` or `{} list`.",
                kind.keyword(),
                kind.keyword()
            ),
        }
    }

    fn help(&self) -> String {
        let mut text = String::from(
            "# Administrative commands\n\
             `token [set <token>]` → show or set the brain token\n\
             `url [set <url>]` → show or set the brain url\n\
             `admin add <user>` → add a user to the administrators\n\
             `admin delete <user>` → remove a user from the administrators\n\
             `admin list` → list the administrators",
        );
        for (kind, enabled) in [
            (ListKind::Commands, self.blocked_commands.is_some()),
            (ListKind::Rooms, self.blocked_rooms.is_some()),
        ] {
            if enabled {
                let (kw, noun) = (kind.keyword(), kind.noun());
                text.push_str(&format!(
                    "\n`{kw} add <{noun}>` → block a {noun}\
                     \n`{kw} delete <{noun}>` → unblock a {noun}\
                     \n`{kw} list` → list the blocked {noun}s"
                ));
            }
        }
        text
    }
}

fn bullet_list(title: &str, items: &[String]) -> String {
    let mut text = title.to_owned();
    for item in items {
        text.push_str("\n - ");
        text.push_str(item);
    }
    text
}
