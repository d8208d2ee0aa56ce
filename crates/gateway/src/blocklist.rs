//! Administrator-managed block-lists: commands and rooms the adapter
//! ignores silently.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use ra_store::{Collection, Document, Filter};

use crate::admin::AdminError;

pub const BLOCKED_COMMANDS: &str = "blocked_commands";
pub const BLOCKED_ROOMS: &str = "blocked_rooms";

const NAME_FIELD: &str = "name";

/// A set of names mirrored from one collection (`{ "name": ... }` docs).
pub struct BlockList {
    collection: Arc<dyn Collection>,
    names: RwLock<Vec<String>>,
}

impl BlockList {
    /// Load the persisted names. A storage failure is logged and the list
    /// starts empty.
    pub async fn load(collection: Arc<dyn Collection>) -> Self {
        let names = match collection.find(&Filter::all()).await {
            Ok(docs) => docs
                .iter()
                .filter_map(|d| d.get(NAME_FIELD).and_then(Value::as_str))
                .map(str::to_owned)
                .collect(),
            Err(e) => {
                tracing::error!(
                    collection = %collection.name(),
                    error = %e,
                    "failed to load block-list, starting empty"
                );
                Vec::new()
            }
        };
        tracing::debug!(collection = %collection.name(), entries = names.len(), "block-list loaded");

        Self {
            collection,
            names: RwLock::new(names),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.read().iter().any(|n| n == name)
    }

    pub fn list(&self) -> Vec<String> {
        self.names.read().clone()
    }

    pub async fn add(&self, name: &str) -> Result<(), AdminError> {
        if self.contains(name) {
            return Err(AdminError::AlreadyBlocked(name.to_owned()));
        }
        let mut doc = Document::new();
        doc.insert(NAME_FIELD.into(), Value::String(name.into()));
        self.collection.insert_one(doc).await?;

        tracing::info!(collection = %self.collection.name(), name, "blocked");
        self.names.write().push(name.to_owned());
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> Result<(), AdminError> {
        let deleted = self
            .collection
            .delete_one(&Filter::eq(NAME_FIELD, name))
            .await?;
        if !deleted {
            return Err(AdminError::NotBlocked(name.to_owned()));
        }

        tracing::info!(collection = %self.collection.name(), name, "unblocked");
        self.names.write().retain(|n| n != name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_store::memory::MemoryCollection;
    use ra_store::{Result as StoreResult, StorageError};

    /// Reads work, every write fails.
    struct ReadOnly(MemoryCollection);

    #[async_trait::async_trait]
    impl Collection for ReadOnly {
        fn name(&self) -> &str {
            self.0.name()
        }
        async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
            self.0.find(filter).await
        }
        async fn insert_one(&self, _doc: Document) -> StoreResult<()> {
            Err(StorageError::Unavailable("read-only".into()))
        }
        async fn delete_one(&self, _filter: &Filter) -> StoreResult<bool> {
            Err(StorageError::Unavailable("read-only".into()))
        }
        async fn update_one(&self, _f: &Filter, _p: Document, _u: bool) -> StoreResult<bool> {
            Err(StorageError::Unavailable("read-only".into()))
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl Collection for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn find(&self, _filter: &Filter) -> StoreResult<Vec<Document>> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn insert_one(&self, _doc: Document) -> StoreResult<()> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn delete_one(&self, _filter: &Filter) -> StoreResult<bool> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn update_one(&self, _f: &Filter, _p: Document, _u: bool) -> StoreResult<bool> {
            Err(StorageError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn add_remove_and_reload() {
        let col = Arc::new(MemoryCollection::new(BLOCKED_COMMANDS));
        let list = BlockList::load(col.clone()).await;

        list.add("deploy").await.unwrap();
        assert!(list.contains("deploy"));
        assert!(matches!(list.add("deploy").await, Err(AdminError::AlreadyBlocked(_))));

        let reloaded = BlockList::load(col.clone()).await;
        assert_eq!(reloaded.list(), vec!["deploy".to_string()]);

        list.remove("deploy").await.unwrap();
        assert!(!list.contains("deploy"));
        assert!(matches!(list.remove("deploy").await, Err(AdminError::NotBlocked(_))));
    }

    #[tokio::test]
    async fn failed_write_leaves_list_unchanged() {
        let inner = MemoryCollection::new(BLOCKED_ROOMS);
        let mut doc = Document::new();
        doc.insert("name".into(), "random".into());
        inner.insert_one(doc).await.unwrap();

        let list = BlockList::load(Arc::new(ReadOnly(inner))).await;
        assert!(list.contains("random"));

        assert!(matches!(list.add("general").await, Err(AdminError::Persistence(_))));
        assert!(!list.contains("general"));

        assert!(matches!(list.remove("random").await, Err(AdminError::Persistence(_))));
        assert!(list.contains("random"));
    }

    #[tokio::test]
    async fn load_failure_starts_empty() {
        let list = BlockList::load(Arc::new(Broken)).await;
        assert!(list.list().is_empty());
    }
}
