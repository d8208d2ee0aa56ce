mod brain;
mod management;
mod observability;
mod sessions;
mod storage;

pub use brain::*;
pub use management::*;
pub use observability::*;
pub use sessions::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub brain: BrainConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Parse `path`, or fall back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// Users allowed to run administrative commands on first start.
    /// Once the settings document exists, the persisted list wins.
    #[serde(default)]
    pub admins: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.brain.url.is_empty() {
            errors.push(ConfigError::error("brain.url", "url must not be empty"));
        } else if !(self.brain.url.starts_with("ws://") || self.brain.url.starts_with("wss://")) {
            errors.push(ConfigError::error(
                "brain.url",
                format!("expected a ws:// or wss:// url, got {:?}", self.brain.url),
            ));
        }

        if self.brain.adapter_id.is_empty() {
            errors.push(ConfigError::error("brain.adapter_id", "adapter_id must not be empty"));
        }

        if self.brain.request_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "brain.request_timeout_secs",
                "request timeout must be greater than 0",
            ));
        }

        if self.brain.reconnect.backoff_factor < 1.0 {
            errors.push(ConfigError::warning(
                "brain.reconnect.backoff_factor",
                "factor below 1.0 shrinks the delay between attempts",
            ));
        }

        if self.brain.resolve_token().is_none() {
            errors.push(ConfigError::warning(
                "brain.token",
                format!(
                    "no brain token configured (set brain.token or ${})",
                    self.brain.token_env
                ),
            ));
        }

        if self.storage.driver == StorageDriver::File
            && self.storage.state_path.as_os_str().is_empty()
        {
            errors.push(ConfigError::error(
                "storage.state_path",
                "state_path must not be empty with the file driver",
            ));
        }

        if self.admin.admins.is_empty() {
            errors.push(ConfigError::warning(
                "admin.admins",
                "no administrators configured; admin commands will be refused",
            ));
        }

        if self.sessions.default_idle_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.default_idle_secs",
                "default idle duration must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be between 0.0 and 1.0",
            ));
        }

        errors
    }
}
