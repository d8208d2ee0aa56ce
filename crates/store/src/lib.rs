//! Document collections backing hooks, settings, and block-lists.
//!
//! The adapter only ever needs single-document operations, so the interface
//! is deliberately small: `find`, `insert_one`, `delete_one`, and
//! `update_one`. Two drivers ship with the crate:
//!
//! - [`MemoryDatabase`]: nothing survives the process.
//! - [`FileDatabase`]: one JSON array per collection, rewritten atomically
//!   on every mutation.

pub mod error;
pub mod file;
pub mod filter;
pub mod memory;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use error::StorageError;
pub use file::FileDatabase;
pub use filter::Filter;
pub use memory::MemoryDatabase;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

pub type Result<T> = std::result::Result<T, StorageError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// All documents matching `filter`, in insertion order.
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>>;

    async fn insert_one(&self, doc: Document) -> Result<()>;

    /// Delete the first matching document. `Ok(false)` when nothing matched.
    async fn delete_one(&self, filter: &Filter) -> Result<bool>;

    /// Merge `patch` into the first matching document. With `upsert`, a
    /// missing document is created from the filter fields plus the patch.
    /// Returns whether a document was modified or created.
    async fn update_one(&self, filter: &Filter, patch: Document, upsert: bool) -> Result<bool>;

    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(filter).await?.into_iter().next())
    }
}

pub trait Database: Send + Sync {
    /// Handle to the named collection, created on first write.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
}

// ── Typed helpers ───────────────────────────────────────────────────

/// Serialize a record into a document. Fails unless `value` is an object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::NotADocument(kind_of(&other).into())),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shared mutation semantics for both drivers.
pub(crate) fn apply_update(
    docs: &mut Vec<Document>,
    filter: &Filter,
    patch: Document,
    upsert: bool,
) -> bool {
    if let Some(doc) = docs.iter_mut().find(|d| filter.matches(d)) {
        doc.extend(patch);
        return true;
    }
    if !upsert {
        return false;
    }
    let mut doc = filter.as_document();
    doc.extend(patch);
    docs.push(doc);
    true
}

pub(crate) fn apply_delete(docs: &mut Vec<Document>, filter: &Filter) -> bool {
    match docs.iter().position(|d| filter.matches(d)) {
        Some(idx) => {
            docs.remove(idx);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: String,
        n: u32,
    }

    #[test]
    fn typed_roundtrip_through_document() {
        let row = Row {
            id: "a".into(),
            n: 3,
        };
        let doc = to_document(&row).unwrap();
        assert_eq!(doc["id"], "a");
        assert_eq!(from_document::<Row>(doc).unwrap(), row);
    }

    #[test]
    fn scalars_are_not_documents() {
        let err = to_document(&42u32).unwrap_err();
        assert!(matches!(err, StorageError::NotADocument(k) if k == "number"));
    }

    #[test]
    fn upsert_creates_from_filter_fields() {
        let mut docs = Vec::new();
        let mut patch = Document::new();
        patch.insert("token".into(), "t".into());

        assert!(apply_update(&mut docs, &Filter::eq("_id", "settings"), patch, true));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], "settings");
        assert_eq!(docs[0]["token"], "t");
    }

    #[test]
    fn update_without_upsert_leaves_empty_collection() {
        let mut docs = Vec::new();
        assert!(!apply_update(&mut docs, &Filter::eq("_id", "x"), Document::new(), false));
        assert!(docs.is_empty());
    }
}
