//! Runtime settings that administrators can change from chat: the brain
//! endpoint and the admin list.
//!
//! Stored as a single document (`_id = "settings"`) in the `settings`
//! collection. The config file only seeds it on first start; afterwards
//! the persisted document wins.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ra_store::{from_document, to_document, Collection, Document, Filter, StorageError};

use crate::admin::AdminError;

pub const SETTINGS_COLLECTION: &str = "settings";
const SETTINGS_ID: &str = "settings";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub brain_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub admins: Vec<String>,
}

pub struct SettingsStore {
    collection: Arc<dyn Collection>,
    current: RwLock<Settings>,
    /// Serialises read-modify-persist so concurrent admin commands never
    /// overwrite each other's changes.
    writes: tokio::sync::Mutex<()>,
}

impl SettingsStore {
    /// Load the settings document, inserting `seed` when none exists yet.
    pub async fn init(collection: Arc<dyn Collection>, seed: Settings) -> Result<Self, StorageError> {
        let current = match collection.find_one(&id_filter()).await? {
            Some(doc) => from_document::<Settings>(doc)?,
            None => {
                let mut doc = to_document(&seed)?;
                doc.insert("_id".into(), Value::String(SETTINGS_ID.into()));
                collection.insert_one(doc).await?;
                tracing::info!(admins = seed.admins.len(), "settings seeded from config");
                seed
            }
        };

        Ok(Self {
            collection,
            current: RwLock::new(current),
            writes: tokio::sync::Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Settings {
        self.current.read().clone()
    }

    pub fn brain_url(&self) -> String {
        self.current.read().brain_url.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().token.clone()
    }

    pub fn admins(&self) -> Vec<String> {
        self.current.read().admins.clone()
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.current.read().admins.iter().any(|a| a == user)
    }

    // ── Mutations (durable first) ────────────────────────────────────

    pub async fn set_token(&self, token: &str) -> Result<(), AdminError> {
        let prefix: String = token.chars().take(6).collect();
        tracing::info!(token_prefix = %prefix, "updating brain token");
        let _gate = self.writes.lock().await;
        self.persist("token", Value::String(token.into())).await?;
        self.current.write().token = Some(token.to_owned());
        Ok(())
    }

    pub async fn set_brain_url(&self, url: &str) -> Result<(), AdminError> {
        tracing::info!(url, "updating brain url");
        let _gate = self.writes.lock().await;
        self.persist("brain_url", Value::String(url.into())).await?;
        self.current.write().brain_url = url.to_owned();
        Ok(())
    }

    pub async fn add_admin(&self, user: &str) -> Result<(), AdminError> {
        let _gate = self.writes.lock().await;
        let mut admins = self.admins();
        if admins.iter().any(|a| a == user) {
            return Err(AdminError::AlreadyAdmin(user.to_owned()));
        }
        admins.push(user.to_owned());

        self.persist("admins", admins_value(&admins)).await?;
        tracing::info!(user, "administrator added");
        self.current.write().admins = admins;
        Ok(())
    }

    pub async fn remove_admin(&self, user: &str) -> Result<(), AdminError> {
        let _gate = self.writes.lock().await;
        let mut admins = self.admins();
        let Some(idx) = admins.iter().position(|a| a == user) else {
            return Err(AdminError::UnknownAdmin(user.to_owned()));
        };
        if admins.len() == 1 {
            return Err(AdminError::LastAdmin);
        }
        admins.remove(idx);

        self.persist("admins", admins_value(&admins)).await?;
        tracing::info!(user, "administrator removed");
        self.current.write().admins = admins;
        Ok(())
    }

    async fn persist(&self, field: &str, value: Value) -> Result<(), StorageError> {
        let mut patch = Document::new();
        patch.insert(field.into(), value);
        self.collection.update_one(&id_filter(), patch, true).await?;
        Ok(())
    }
}

fn id_filter() -> Filter {
    Filter::eq("_id", SETTINGS_ID)
}

fn admins_value(admins: &[String]) -> Value {
    Value::Array(admins.iter().cloned().map(Value::String).collect())
}
