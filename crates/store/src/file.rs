//! File driver: `<state_path>/<collection>.json`, one pretty-printed array
//! per collection.
//!
//! Every mutation is applied to a copy, written to `<name>.json.tmp`, and
//! renamed over the live file. The in-memory copy only changes once the
//! rename succeeds, so a failed write leaves both sides untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    apply_delete, apply_update, Collection, Database, Document, Filter, Result, StorageError,
};

pub struct FileDatabase {
    root: PathBuf,
    collections: parking_lot::Mutex<HashMap<String, Arc<FileCollection>>>,
}

impl FileDatabase {
    /// Open (and create if needed) the state directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        tracing::debug!(path = %root.display(), "file database opened");
        Ok(Self {
            root,
            collections: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Database for FileDatabase {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        self.collections
            .lock()
            .entry(name.to_owned())
            .or_insert_with(|| {
                Arc::new(FileCollection {
                    name: name.to_owned(),
                    path: self.root.join(format!("{name}.json")),
                    docs: Mutex::new(None),
                })
            })
            .clone()
    }
}

pub struct FileCollection {
    name: String,
    path: PathBuf,
    /// `None` until first access.
    docs: Mutex<Option<Vec<Document>>>,
}

impl FileCollection {
    async fn read_from_disk(&self) -> Result<Vec<Document>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let docs: Vec<Document> =
            serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                collection: self.name.clone(),
                message: e.to_string(),
            })?;
        tracing::debug!(collection = %self.name, count = docs.len(), "collection loaded");
        Ok(docs)
    }

    async fn write_to_disk(&self, docs: &[Document]) -> Result<()> {
        let body = serde_json::to_string_pretty(docs)?;
        let tmp = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::io(&self.path, e));
        }
        Ok(())
    }

    /// Run `f` against a copy of the documents and persist the copy when
    /// `f` reports a change.
    async fn mutate<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<Document>) -> bool + Send,
    {
        let mut guard = self.docs.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_from_disk().await?);
        }
        let Some(current) = guard.as_ref() else {
            return Err(StorageError::Unavailable(self.name.clone()));
        };

        let mut next = current.clone();
        if !f(&mut next) {
            return Ok(false);
        }
        if let Err(e) = self.write_to_disk(&next).await {
            tracing::warn!(collection = %self.name, error = %e, "collection write failed");
            return Err(e);
        }
        *guard = Some(next);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Collection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let mut guard = self.docs.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_from_disk().await?);
        }
        Ok(guard
            .iter()
            .flatten()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn insert_one(&self, doc: Document) -> Result<()> {
        self.mutate(move |docs| {
            docs.push(doc);
            true
        })
        .await
        .map(|_| ())
    }

    async fn delete_one(&self, filter: &Filter) -> Result<bool> {
        self.mutate(|docs| apply_delete(docs, filter)).await
    }

    async fn update_one(&self, filter: &Filter, patch: Document, upsert: bool) -> Result<bool> {
        self.mutate(move |docs| apply_update(docs, filter, patch, upsert))
            .await
    }
}
