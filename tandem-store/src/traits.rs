//! Store contracts consumed by the coordination layer.
//!
//! `DocumentStore` is the seam every coordinator takes as an injected
//! `Arc<dyn DocumentStore>`. `StoreTransaction` is the handle a
//! transaction body works against: reads come first and are recorded,
//! writes are buffered, and `commit` applies them atomically only if no
//! read document changed in the meantime.

use async_trait::async_trait;

use crate::document::{Document, Fields};
use crate::error::Result;
use crate::ops::{SetMode, Updates};
use crate::path::{CollectionPath, DocPath};
use crate::query::Filter;
use crate::watch::DocumentWatch;

/// A transactional document store with change subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a single document.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// Write a document, creating it when absent.
    async fn set(&self, path: &DocPath, fields: Fields, mode: SetMode) -> Result<()>;

    /// Apply field operations, creating the document when absent.
    async fn update(&self, path: &DocPath, updates: Updates) -> Result<()>;

    /// Create a document with a store-assigned id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<DocPath>;

    /// Documents in the collection matching the filter, ordered by path.
    async fn query(&self, collection: &CollectionPath, filter: &Filter) -> Result<Vec<Document>>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Subscribe to a document. The stream yields the current state
    /// immediately, then the state after every committed change;
    /// dropping the stream unsubscribes.
    async fn watch(&self, path: &DocPath) -> Result<DocumentWatch>;
}

/// Handle passed through a transaction body.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read a document, recording it in the transaction's read set.
    async fn get(&mut self, path: &DocPath) -> Result<Option<Document>>;

    /// Buffer a document write.
    fn set(&mut self, path: &DocPath, fields: Fields, mode: SetMode);

    /// Buffer field operations.
    fn update(&mut self, path: &DocPath, updates: Updates);

    /// Apply the buffered writes atomically. Fails with
    /// [`StoreError::Conflict`](crate::StoreError::Conflict) when any
    /// document in the read set changed since it was read.
    async fn commit(self: Box<Self>) -> Result<()>;
}
