pub mod chat;
pub mod config;
pub mod hooks;
pub mod serve;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ra_domain::config::Config;

/// relay-adapter: bridges chat platforms to a remote brain.
#[derive(Debug, Parser)]
#[command(name = "relay-adapter", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the adapter over stdio (default when no subcommand is given).
    ///
    /// Reads one JSON inbound message per line on stdin and writes one
    /// JSON outgoing action per line on stdout.
    Serve,
    /// Talk to the brain from a terminal as if it were a chat room.
    Chat {
        /// Room the messages appear to come from.
        #[arg(long, default_value = "cli")]
        room: String,
        /// User the messages appear to come from.
        #[arg(long, default_value_t = default_user())]
        user: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Inspect registered hooks.
    #[command(subcommand)]
    Hooks(HooksCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum HooksCommand {
    /// List the hooks persisted in the state directory.
    List {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".into())
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `RELAY_CONFIG` (or
/// `relay.toml` by default). Returns the parsed [`Config`] and the path
/// that was used.
pub fn load_config() -> anyhow::Result<(Config, PathBuf)> {
    let config_path = PathBuf::from(
        std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "relay.toml".into()),
    );
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    Ok((config, config_path))
}
