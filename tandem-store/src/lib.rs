//! Tandem document store abstraction.
//!
//! The coordination crates treat persistence as an injected
//! `Arc<dyn DocumentStore>`: a transactional document store with
//! optimistic-concurrency commits and per-document change subscriptions.
//! [`MemoryStore`] is the in-process reference implementation and the
//! test double for the rest of the workspace.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              DocumentStore               │
//! │   get / set / update / add / query       │
//! │   begin() ──► StoreTransaction           │
//! │   watch() ──► DocumentWatch              │
//! └────────────────────┬─────────────────────┘
//!                      │
//!               ┌──────▼──────┐
//!               │ MemoryStore │
//!               └─────────────┘
//! ```

pub mod document;
pub mod error;
pub mod memory;
pub mod ops;
pub mod path;
pub mod query;
pub mod traits;
pub mod watch;

// Re-export main types
pub use document::{Document, Fields};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use ops::{FieldOp, SetMode, Updates};
pub use path::{CollectionPath, DocPath};
pub use query::Filter;
pub use traits::{DocumentStore, StoreTransaction};
pub use watch::DocumentWatch;
