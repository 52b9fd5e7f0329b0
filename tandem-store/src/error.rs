//! Error types for store operations.

/// Error types for document-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic commit rejected because a document read by the
    /// transaction changed before the commit landed
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Document does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Malformed document or collection path
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
