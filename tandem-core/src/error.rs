//! Error types for the coordination layer.

use tandem_store::StoreError;
use tandem_suggest::SuggestError;

/// Error types for pairing and confirmation operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Store operation failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Suggestion provider failed
    #[error("Suggestion error: {0}")]
    Suggest(#[from] SuggestError),

    /// Conflicting writers outpaced every commit attempt; safe to retry
    /// later
    #[error("Retries exhausted after {attempts} attempts: {operation}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },

    /// Caller does not belong to the record it tried to act on
    #[error("{participant} is not a participant of {record}")]
    NotAParticipant { participant: String, record: String },

    /// Task completion requires both sides to have accepted first
    #[error("Pair {0} is not mutually accepted")]
    NotAccepted(String),

    /// Pair is no longer active
    #[error("Pair {0} is no longer active")]
    PairClosed(String),

    /// Action is already completed and cannot be joined
    #[error("Action {0} is already completed")]
    ActionClosed(String),

    /// Record does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Identifier is empty, reserved, or contains path separators
    #[error("Invalid {kind} identifier: '{id}'")]
    InvalidIdentifier { kind: &'static str, id: String },

    /// Stored record cannot be decoded
    #[error("Malformed record at {path}: {reason}")]
    Malformed { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
