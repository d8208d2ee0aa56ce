//! Hook registry: write-through cache over the `hooks` collection.
//!
//! A hook is in memory only after its document is durably stored, and it
//! leaves memory only after the document is gone. Removal notifies the
//! close callback (the brain) exactly once per hook.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use ra_domain::trace::TraceEvent;
use ra_domain::{HookMessage, HookRequest};
use ra_store::{from_document, to_document, Collection, Filter, StorageError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A registered hook as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHook {
    pub hook_id: String,
    pub room: String,
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub delete_on_deliver: bool,
}

/// Where a hook message should be posted.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub room: String,
    pub message: HookMessage,
    /// The hook was torn down as part of this delivery.
    pub removed: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error("unknown hook: {0}")]
    UnknownHook(String),

    #[error("hook already registered: {0}")]
    AlreadyRegistered(String),

    #[error("hook persistence: {0}")]
    Persistence(#[from] StorageError),

    #[error("removing hook {hook_id} after delivery: {source}")]
    Removal {
        hook_id: String,
        #[source]
        source: StorageError,
    },
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Told about every hook the registry removes.
#[async_trait::async_trait]
pub trait HookCloseNotifier: Send + Sync {
    async fn hook_closed(&self, hook: &StoredHook) -> Result<(), BoxError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HookRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HookRegistry {
    collection: Arc<dyn Collection>,
    notifier: Arc<dyn HookCloseNotifier>,
    /// hook_id → (insertion sequence, hook)
    hooks: RwLock<HashMap<String, (u64, StoredHook)>>,
    next_seq: parking_lot::Mutex<u64>,
    /// Held across every check-persist-update sequence so a hook id is
    /// stored at most once and closed at most once.
    writes: tokio::sync::Mutex<()>,
}

impl HookRegistry {
    pub fn new(collection: Arc<dyn Collection>, notifier: Arc<dyn HookCloseNotifier>) -> Self {
        Self {
            collection,
            notifier,
            hooks: RwLock::new(HashMap::new()),
            next_seq: parking_lot::Mutex::new(0),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    /// Bulk-load persisted hooks. A storage failure leaves the registry
    /// empty and is only logged. Returns the number of hooks loaded.
    pub async fn load(&self) -> usize {
        let docs = match self.collection.find(&Filter::all()).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::error!(
                    collection = %self.collection.name(),
                    error = %e,
                    "failed to load hooks, starting with none"
                );
                return 0;
            }
        };

        let mut loaded = 0;
        for doc in docs {
            match from_document::<StoredHook>(doc) {
                Ok(hook) => {
                    self.insert_memory(hook);
                    loaded += 1;
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed hook document"),
            }
        }
        tracing::info!(count = loaded, "hooks loaded");
        loaded
    }

    /// Persist a hook for `room`, then make it addressable.
    pub async fn register(&self, request: &HookRequest, room: &str) -> Result<StoredHook, HookError> {
        let _gate = self.writes.lock().await;
        if self.contains(&request.id) {
            return Err(HookError::AlreadyRegistered(request.id.clone()));
        }

        let hook = StoredHook {
            hook_id: request.id.clone(),
            room: room.to_owned(),
            skill: request.skill.clone(),
            delete_on_deliver: request.delete_on_deliver,
        };
        self.collection.insert_one(to_document(&hook)?).await?;
        self.insert_memory(hook.clone());

        TraceEvent::HookRegistered {
            hook_id: hook.hook_id.clone(),
            room: hook.room.clone(),
            skill: hook.skill.clone(),
        }
        .emit();
        Ok(hook)
    }

    /// Resolve a brain-pushed message to its room. Tears the hook down first
    /// when the message carries `delete_hook`.
    pub async fn deliver(&self, hook_id: &str, message: HookMessage) -> Result<Delivery, HookError> {
        let hook = self
            .get(hook_id)
            .ok_or_else(|| HookError::UnknownHook(hook_id.to_owned()))?;

        let removed = message.delete_hook;
        if removed {
            self.remove(hook_id).await.map_err(|e| match e {
                HookError::Persistence(source) => HookError::Removal {
                    hook_id: hook_id.to_owned(),
                    source,
                },
                other => other,
            })?;
        }

        TraceEvent::HookDelivered {
            hook_id: hook_id.to_owned(),
            room: hook.room.clone(),
            removed,
        }
        .emit();
        Ok(Delivery {
            room: hook.room,
            message,
            removed,
        })
    }

    /// Delete the stored document, notify, then forget the hook.
    pub async fn remove(&self, hook_id: &str) -> Result<StoredHook, HookError> {
        let _gate = self.writes.lock().await;

        let hook = self
            .get(hook_id)
            .ok_or_else(|| HookError::UnknownHook(hook_id.to_owned()))?;

        let deleted = self
            .collection
            .delete_one(&Filter::eq("hook_id", hook_id))
            .await?;
        if !deleted {
            tracing::warn!(hook_id = %hook_id, "hook had no stored document");
        }

        if let Err(e) = self.notifier.hook_closed(&hook).await {
            tracing::warn!(hook_id = %hook_id, error = %e, "hook close notification failed");
        }

        self.hooks.write().remove(hook_id);
        TraceEvent::HookRemoved {
            hook_id: hook.hook_id.clone(),
            room: hook.room.clone(),
        }
        .emit();
        Ok(hook)
    }

    /// Snapshot of active hooks in registration order.
    pub fn list(&self) -> Vec<StoredHook> {
        let hooks = self.hooks.read();
        let mut entries: Vec<&(u64, StoredHook)> = hooks.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, h)| h.clone()).collect()
    }

    pub fn get(&self, hook_id: &str) -> Option<StoredHook> {
        self.hooks.read().get(hook_id).map(|(_, h)| h.clone())
    }

    pub fn contains(&self, hook_id: &str) -> bool {
        self.hooks.read().contains_key(hook_id)
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_memory(&self, hook: StoredHook) {
        let seq = {
            let mut next = self.next_seq.lock();
            *next += 1;
            *next
        };
        self.hooks.write().insert(hook.hook_id.clone(), (seq, hook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_store::{Database, Document, MemoryDatabase};
    use std::sync::atomic::{AtomicBool, Ordering};

    // ── Test doubles ────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingNotifier {
        closed: parking_lot::Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        fn closed(&self) -> Vec<String> {
            self.closed.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl HookCloseNotifier for RecordingNotifier {
        async fn hook_closed(&self, hook: &StoredHook) -> Result<(), BoxError> {
            self.closed.lock().push(hook.hook_id.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err("brain unreachable".into());
            }
            Ok(())
        }
    }

    /// Wraps a real collection; writes fail while `broken` is set.
    struct FlakyCollection {
        inner: Arc<dyn Collection>,
        broken: AtomicBool,
    }

    impl FlakyCollection {
        fn check(&self) -> ra_store::Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("disk on fire".into()));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Collection for FlakyCollection {
        fn name(&self) -> &str {
            "hooks"
        }
        async fn find(&self, filter: &Filter) -> ra_store::Result<Vec<Document>> {
            self.check()?;
            self.inner.find(filter).await
        }
        async fn insert_one(&self, doc: Document) -> ra_store::Result<()> {
            self.check()?;
            self.inner.insert_one(doc).await
        }
        async fn delete_one(&self, filter: &Filter) -> ra_store::Result<bool> {
            self.check()?;
            self.inner.delete_one(filter).await
        }
        async fn update_one(
            &self,
            filter: &Filter,
            patch: Document,
            upsert: bool,
        ) -> ra_store::Result<bool> {
            self.check()?;
            self.inner.update_one(filter, patch, upsert).await
        }
    }

    struct Fixture {
        registry: HookRegistry,
        notifier: Arc<RecordingNotifier>,
        collection: Arc<FlakyCollection>,
    }

    fn fixture() -> Fixture {
        let db = MemoryDatabase::new();
        let collection = Arc::new(FlakyCollection {
            inner: db.collection("hooks"),
            broken: AtomicBool::new(false),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = HookRegistry::new(collection.clone(), notifier.clone());
        Fixture {
            registry,
            notifier,
            collection,
        }
    }

    fn request(id: &str) -> HookRequest {
        HookRequest {
            id: id.into(),
            skill: "deploy".into(),
            delete_on_deliver: false,
        }
    }

    fn msg(text: &str, delete_hook: bool) -> HookMessage {
        HookMessage {
            text: text.into(),
            delete_hook,
            ..Default::default()
        }
    }

    async fn stored_ids(f: &Fixture) -> Vec<String> {
        f.collection
            .inner
            .find(&Filter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["hook_id"].as_str().unwrap().to_owned())
            .collect()
    }

    // ── Properties ──────────────────────────────────────────────────

    #[tokio::test]
    async fn delivery_without_delete_keeps_hook() {
        let f = fixture();
        f.registry.register(&request("h1"), "general").await.unwrap();

        let d = f.registry.deliver("h1", msg("build 1 done", false)).await.unwrap();
        assert_eq!(d.room, "general");
        assert_eq!(d.message.text, "build 1 done");
        assert!(!d.removed);

        // Repeated deliveries are fine.
        f.registry.deliver("h1", msg("build 2 done", false)).await.unwrap();
        assert_eq!(f.registry.list().len(), 1);
        assert!(f.notifier.closed().is_empty());
    }

    #[tokio::test]
    async fn delivery_with_delete_removes_and_notifies_once() {
        let f = fixture();
        f.registry.register(&request("h1"), "general").await.unwrap();

        let d = f.registry.deliver("h1", msg("bye", true)).await.unwrap();
        assert_eq!(d.room, "general");
        assert!(d.removed);
        assert!(f.registry.list().is_empty());
        assert!(stored_ids(&f).await.is_empty());
        assert_eq!(f.notifier.closed(), vec!["h1"]);
    }

    #[tokio::test]
    async fn stored_delete_flag_does_not_tear_down_on_its_own() {
        let f = fixture();
        let mut req = request("h1");
        req.delete_on_deliver = true;
        f.registry.register(&req, "ops").await.unwrap();

        let d = f.registry.deliver("h1", msg("first", false)).await.unwrap();
        assert!(!d.removed);
        assert!(f.registry.get("h1").unwrap().delete_on_deliver);
        assert!(f.notifier.closed().is_empty());

        assert!(f.registry.deliver("h1", msg("last", true)).await.unwrap().removed);
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn unknown_hook_delivery_fails_without_notification() {
        let f = fixture();
        let err = f.registry.deliver("ghost", msg("boo", true)).await.unwrap_err();
        assert!(matches!(err, HookError::UnknownHook(id) if id == "ghost"));
        assert!(f.notifier.closed().is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_hook_unregistered() {
        let f = fixture();
        f.collection.broken.store(true, Ordering::SeqCst);

        let err = f.registry.register(&request("h1"), "general").await.unwrap_err();
        assert!(matches!(err, HookError::Persistence(_)));
        assert!(!f.registry.contains("h1"));
    }

    #[tokio::test]
    async fn failed_delete_keeps_hook_and_fails_delivery() {
        let f = fixture();
        f.registry.register(&request("h1"), "general").await.unwrap();
        f.collection.broken.store(true, Ordering::SeqCst);

        let err = f.registry.deliver("h1", msg("bye", true)).await.unwrap_err();
        assert!(matches!(err, HookError::Removal { ref hook_id, .. } if hook_id == "h1"));
        assert!(f.registry.contains("h1"));
        assert!(f.notifier.closed().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_does_not_block_removal() {
        let f = fixture();
        f.registry.register(&request("h1"), "general").await.unwrap();
        f.notifier.fail.store(true, Ordering::SeqCst);

        f.registry.remove("h1").await.unwrap();
        assert!(!f.registry.contains("h1"));
        assert_eq!(f.notifier.closed(), vec!["h1"]);
    }

    #[tokio::test]
    async fn remove_unknown_hook_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.registry.remove("nope").await,
            Err(HookError::UnknownHook(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_before_persisting() {
        let f = fixture();
        f.registry.register(&request("h1"), "a").await.unwrap();
        let err = f.registry.register(&request("h1"), "b").await.unwrap_err();
        assert!(matches!(err, HookError::AlreadyRegistered(_)));
        assert_eq!(stored_ids(&f).await, vec!["h1"]);
        assert_eq!(f.registry.get("h1").unwrap().room, "a");
    }

    #[tokio::test]
    async fn concurrent_removals_notify_once() {
        let f = Arc::new(fixture());
        f.registry.register(&request("h1"), "general").await.unwrap();

        let (a, b) = tokio::join!(f.registry.remove("h1"), f.registry.remove("h1"));
        assert!(a.is_ok() ^ b.is_ok());
        assert_eq!(f.notifier.closed(), vec!["h1"]);
    }

    #[tokio::test]
    async fn concurrent_registrations_store_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let db = ra_store::FileDatabase::open(dir.path()).unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = HookRegistry::new(db.collection("hooks"), notifier.clone());

        let req_a = request("h1");
        let req_b = request("h1");
        let (a, b) = tokio::join!(
            registry.register(&req_a, "general"),
            registry.register(&req_b, "ops"),
        );
        assert!(a.is_ok() ^ b.is_ok());
        assert!(matches!(
            a.err().or(b.err()),
            Some(HookError::AlreadyRegistered(id)) if id == "h1"
        ));
        assert_eq!(db.collection("hooks").find(&Filter::all()).await.unwrap().len(), 1);

        registry.remove("h1").await.unwrap();
        let reopened = ra_store::FileDatabase::open(dir.path()).unwrap();
        let restarted = HookRegistry::new(reopened.collection("hooks"), notifier);
        assert_eq!(restarted.load().await, 0);
    }

    #[tokio::test]
    async fn load_restores_persisted_hooks_in_order() {
        let f = fixture();
        for id in ["h1", "h2", "h3"] {
            f.registry.register(&request(id), "general").await.unwrap();
        }

        let reloaded = HookRegistry::new(f.collection.clone(), f.notifier.clone());
        assert_eq!(reloaded.load().await, 3);
        let ids: Vec<String> = reloaded.list().into_iter().map(|h| h.hook_id).collect();
        assert_eq!(ids, vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn load_failure_leaves_registry_empty() {
        let f = fixture();
        f.registry.register(&request("h1"), "general").await.unwrap();
        f.collection.broken.store(true, Ordering::SeqCst);

        let reloaded = HookRegistry::new(f.collection.clone(), f.notifier.clone());
        assert_eq!(reloaded.load().await, 0);
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn load_skips_malformed_documents() {
        let f = fixture();
        let mut junk = Document::new();
        junk.insert("unrelated".into(), 1.into());
        f.collection.inner.insert_one(junk).await.unwrap();
        f.registry.register(&request("h1"), "general").await.unwrap();

        let reloaded = HookRegistry::new(f.collection.clone(), f.notifier.clone());
        assert_eq!(reloaded.load().await, 1);
    }
}
