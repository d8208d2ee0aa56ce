use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{apply_delete, apply_update, Collection, Database, Document, Filter, Result};

/// In-process database. Handles to the same name share their documents.
#[derive(Default)]
pub struct MemoryDatabase {
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemoryDatabase {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        self.collections
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }
}

pub struct MemoryCollection {
    name: String,
    docs: Mutex<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self
            .docs
            .lock()
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn insert_one(&self, doc: Document) -> Result<()> {
        self.docs.lock().push(doc);
        Ok(())
    }

    async fn delete_one(&self, filter: &Filter) -> Result<bool> {
        Ok(apply_delete(&mut self.docs.lock(), filter))
    }

    async fn update_one(&self, filter: &Filter, patch: Document, upsert: bool) -> Result<bool> {
        Ok(apply_update(&mut self.docs.lock(), filter, patch, upsert))
    }
}
