//! In-memory store with full transaction and watch semantics.
//!
//! Reference implementation of the store contracts and the test double
//! for the coordination crates. Documents and watch senders live under
//! one lock, so subscribers observe commits in commit order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::document::{Document, Fields};
use crate::error::{Result, StoreError};
use crate::ops::{apply_op, SetMode, Updates};
use crate::path::{CollectionPath, DocPath};
use crate::query::Filter;
use crate::traits::{DocumentStore, StoreTransaction};
use crate::watch::DocumentWatch;

#[derive(Debug, Clone)]
struct StoredDoc {
    fields: Fields,
    revision: u64,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryInner {
    docs: HashMap<DocPath, StoredDoc>,
    watchers: HashMap<DocPath, watch::Sender<Option<Document>>>,
}

impl MemoryInner {
    fn snapshot(&self, path: &DocPath) -> Option<Document> {
        self.docs.get(path).map(|stored| Document {
            path: path.clone(),
            fields: stored.fields.clone(),
            revision: stored.revision,
            updated_at: stored.updated_at,
        })
    }

    fn notify(&self, path: &DocPath) {
        if let Some(sender) = self.watchers.get(path) {
            sender.send_replace(self.snapshot(path));
        }
    }

    fn apply_set(&mut self, path: &DocPath, fields: Fields, mode: SetMode) {
        let now = Utc::now();
        let entry = self.docs.entry(path.clone()).or_insert_with(|| StoredDoc {
            fields: Fields::new(),
            revision: 0,
            updated_at: now,
        });
        match mode {
            SetMode::Overwrite => entry.fields = fields,
            SetMode::Merge => entry.fields.extend(fields),
        }
        entry.revision += 1;
        entry.updated_at = now;
        self.notify(path);
    }

    fn apply_update(&mut self, path: &DocPath, updates: &Updates) {
        let now = Utc::now();
        let entry = self.docs.entry(path.clone()).or_insert_with(|| StoredDoc {
            fields: Fields::new(),
            revision: 0,
            updated_at: now,
        });
        for (name, op) in updates {
            apply_op(&mut entry.fields, name, op);
        }
        entry.revision += 1;
        entry.updated_at = now;
        self.notify(path);
    }
}

struct Shared {
    inner: RwLock<MemoryInner>,
    forced_conflicts: AtomicU32,
    commit_attempts: AtomicU32,
}

/// In-memory [`DocumentStore`].
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: RwLock::new(MemoryInner::default()),
                forced_conflicts: AtomicU32::new(0),
                commit_attempts: AtomicU32::new(0),
            }),
        }
    }

    /// Test hook: force the next `n` commits to fail with `Conflict`
    /// before touching any state.
    pub fn inject_commit_conflicts(&self, n: u32) {
        self.shared.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of commits attempted so far, forced failures included.
    pub fn commit_attempts(&self) -> u32 {
        self.shared.commit_attempts.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let inner = self.shared.inner.read().await;
        Ok(inner.snapshot(path))
    }

    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<()> {
        let mut inner = self.shared.inner.write().await;
        inner.apply_set(path, fields, mode);
        Ok(())
    }

    async fn update(&self, path: &DocPath, updates: Updates) -> Result<()> {
        let mut inner = self.shared.inner.write().await;
        inner.apply_update(path, &updates);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocPath> {
        let path = collection.doc(&uuid::Uuid::new_v4().to_string())?;
        let mut inner = self.shared.inner.write().await;
        inner.apply_set(&path, fields, SetMode::Overwrite);
        Ok(path)
    }

    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>> {
        let inner = self.shared.inner.read().await;
        let mut matches: Vec<Document> = inner
            .docs
            .iter()
            .filter(|(path, stored)| collection.contains(path) && filter.matches(&stored.fields))
            .map(|(path, stored)| Document {
                path: path.clone(),
                fields: stored.fields.clone(),
                revision: stored.revision,
                updated_at: stored.updated_at,
            })
            .collect();
        matches.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(matches)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    async fn watch(&self, path: &DocPath) -> Result<DocumentWatch> {
        let mut inner = self.shared.inner.write().await;
        let receiver = match inner.watchers.get(path) {
            Some(sender) => sender.subscribe(),
            None => {
                // Senders are kept for the store's lifetime; the set of
                // watched paths is small and bounded by the caller.
                let (sender, receiver) = watch::channel(inner.snapshot(path));
                inner.watchers.insert(path.clone(), sender);
                receiver
            }
        };
        Ok(DocumentWatch::new(receiver))
    }
}

enum BufferedWrite {
    Set {
        path: DocPath,
        fields: Fields,
        mode: SetMode,
    },
    Update {
        path: DocPath,
        updates: Updates,
    },
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    // Revision of each document when read; 0 means it did not exist.
    reads: HashMap<DocPath, u64>,
    writes: Vec<BufferedWrite>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>> {
        let inner = self.shared.inner.read().await;
        let snapshot = inner.snapshot(path);
        let revision = snapshot.as_ref().map(|d| d.revision).unwrap_or(0);
        self.reads.insert(path.clone(), revision);
        Ok(snapshot)
    }

    fn set(&mut self, path: &DocPath, fields: Fields, mode: SetMode) {
        self.writes.push(BufferedWrite::Set {
            path: path.clone(),
            fields,
            mode,
        });
    }

    fn update(&mut self, path: &DocPath, updates: Updates) {
        self.writes.push(BufferedWrite::Update {
            path: path.clone(),
            updates,
        });
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.shared.commit_attempts.fetch_add(1, Ordering::SeqCst);

        let forced = this
            .shared
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            debug!("Forced commit conflict");
            return Err(StoreError::Conflict("forced by test hook".to_string()));
        }

        let mut inner = this.shared.inner.write().await;

        // Validate the read set against current revisions.
        for (path, seen) in &this.reads {
            let current = inner.docs.get(path).map(|d| d.revision).unwrap_or(0);
            if current != *seen {
                debug!(path = %path, seen, current, "Commit conflict");
                return Err(StoreError::Conflict(path.to_string()));
            }
        }

        // Watchers fire under the same lock, so subscribers never see
        // two commits out of order.
        for write in this.writes {
            match write {
                BufferedWrite::Set { path, fields, mode } => inner.apply_set(&path, fields, mode),
                BufferedWrite::Update { path, updates } => inner.apply_update(&path, &updates),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::FieldOp;
    use futures::StreamExt;
    use serde_json::json;

    fn path(raw: &str) -> DocPath {
        DocPath::parse(raw).unwrap()
    }

    fn collection(raw: &str) -> CollectionPath {
        CollectionPath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        let doc = path("users/u1");

        store
            .set(
                &doc,
                Fields::from([("points".to_string(), json!(5))]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        let read = store.get(&doc).await.unwrap().unwrap();
        assert_eq!(read.i64_field("points"), Some(5));
        assert_eq!(read.revision, 1);
    }

    #[tokio::test]
    async fn test_merge_keeps_unnamed_fields() {
        let store = MemoryStore::new();
        let doc = path("users/u1");

        store
            .set(
                &doc,
                Fields::from([("a".to_string(), json!(1)), ("b".to_string(), json!(2))]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();
        store
            .set(
                &doc,
                Fields::from([("b".to_string(), json!(9))]),
                SetMode::Merge,
            )
            .await
            .unwrap();

        let read = store.get(&doc).await.unwrap().unwrap();
        assert_eq!(read.i64_field("a"), Some(1));
        assert_eq!(read.i64_field("b"), Some(9));
        assert_eq!(read.revision, 2);
    }

    #[tokio::test]
    async fn test_update_creates_missing_document() {
        let store = MemoryStore::new();
        let doc = path("users/u1");

        store
            .update(
                &doc,
                vec![("points".to_string(), FieldOp::Increment(10))],
            )
            .await
            .unwrap();

        let read = store.get(&doc).await.unwrap().unwrap();
        assert_eq!(read.i64_field("points"), Some(10));
    }

    #[tokio::test]
    async fn test_add_assigns_id_and_query_filters() {
        let store = MemoryStore::new();
        let pairs = collection("topics/t1/pairs");

        let open = store
            .add(
                &pairs,
                Fields::from([("active".to_string(), json!(true))]),
            )
            .await
            .unwrap();
        store
            .add(
                &pairs,
                Fields::from([("active".to_string(), json!(false))]),
            )
            .await
            .unwrap();
        // Document in a subcollection must not match the parent query.
        store
            .set(
                &path("topics/t1/pairs/x/log/l1"),
                Fields::from([("active".to_string(), json!(true))]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        assert!(pairs.contains(&open));

        let active = store
            .query(&pairs, &Filter::field("active", true))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].path, open);
    }

    #[tokio::test]
    async fn test_commit_applies_buffered_writes_atomically() {
        let store = MemoryStore::new();
        let a = path("users/a");
        let b = path("users/b");

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&a).await.unwrap().is_none());
        tx.set(
            &a,
            Fields::from([("points".to_string(), json!(1))]),
            SetMode::Overwrite,
        );
        tx.update(&b, vec![("points".to_string(), FieldOp::Increment(2))]);

        // Nothing visible before commit.
        assert!(store.get(&a).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(
            store.get(&a).await.unwrap().unwrap().i64_field("points"),
            Some(1)
        );
        assert_eq!(
            store.get(&b).await.unwrap().unwrap().i64_field("points"),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_conflict_when_read_document_changes() {
        let store = MemoryStore::new();
        let doc = path("users/u1");
        store
            .set(
                &doc,
                Fields::from([("points".to_string(), json!(0))]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.get(&doc).await.unwrap();

        // Interleaved writer bumps the revision.
        store
            .update(&doc, vec![("points".to_string(), FieldOp::Increment(1))])
            .await
            .unwrap();

        tx.update(&doc, vec![("points".to_string(), FieldOp::Increment(5))]);
        let result = tx.commit().await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // The buffered write was discarded.
        assert_eq!(
            store.get(&doc).await.unwrap().unwrap().i64_field("points"),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_conflict_when_absent_document_appears() {
        let store = MemoryStore::new();
        let doc = path("users/u1");

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&doc).await.unwrap().is_none());

        store
            .set(&doc, Fields::new(), SetMode::Overwrite)
            .await
            .unwrap();

        tx.set(&doc, Fields::new(), SetMode::Overwrite);
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryStore::new();
        let doc = path("users/u1");
        store.inject_commit_conflicts(2);

        for _ in 0..2 {
            let mut tx = store.begin().await.unwrap();
            tx.set(&doc, Fields::new(), SetMode::Overwrite);
            assert!(matches!(
                tx.commit().await,
                Err(StoreError::Conflict(_))
            ));
        }

        let mut tx = store.begin().await.unwrap();
        tx.set(&doc, Fields::new(), SetMode::Overwrite);
        tx.commit().await.unwrap();
        assert_eq!(store.commit_attempts(), 3);
    }

    #[tokio::test]
    async fn test_watch_yields_initial_then_committed_states() {
        let store = MemoryStore::new();
        let doc = path("users/u1");

        let mut updates = store.watch(&doc).await.unwrap();
        assert!(updates.next().await.unwrap().is_none());

        store
            .set(
                &doc,
                Fields::from([("points".to_string(), json!(1))]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();
        let seen = updates.next().await.unwrap().unwrap();
        assert_eq!(seen.revision, 1);

        store
            .update(&doc, vec![("points".to_string(), FieldOp::Increment(1))])
            .await
            .unwrap();
        let seen = updates.next().await.unwrap().unwrap();
        assert_eq!(seen.revision, 2);
        assert_eq!(seen.i64_field("points"), Some(2));
    }

    #[tokio::test]
    async fn test_watch_subscribing_later_sees_current_state() {
        let store = MemoryStore::new();
        let doc = path("users/u1");
        store
            .set(
                &doc,
                Fields::from([("points".to_string(), json!(3))]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        // First subscription creates the sender, second reuses it.
        let mut first = store.watch(&doc).await.unwrap();
        assert!(first.next().await.unwrap().is_some());

        store
            .update(&doc, vec![("points".to_string(), FieldOp::Increment(1))])
            .await
            .unwrap();

        let mut second = store.watch(&doc).await.unwrap();
        let seen = second.next().await.unwrap().unwrap();
        assert_eq!(seen.i64_field("points"), Some(4));
    }
}
