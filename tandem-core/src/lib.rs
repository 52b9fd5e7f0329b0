//! Tandem coordination engine.
//!
//! Pairs participants for two-person tasks and collects unanimous
//! confirmations for group actions, with points awarded exactly once
//! per completion. All state lives in an injected document store;
//! every coordinator races safely against concurrent instances of
//! itself through conditional transactions and bounded retries.
//!
//! ## Coordinators
//!
//! - **Pairing**: slot-claiming topic join with coin-flip roles, task
//!   assignment and mutual acceptance
//! - **Readiness**: live pair-state stream, silent until both slots fill
//! - **Confirmation**: unanimity-gated group actions with atomic payout
//! - **Ledger**: commutative point grants and payout markers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │   Pairing    │  │  Readiness   │  │ Confirmation │
//! │ Coordinator  │  │   Watcher    │  │ Coordinator  │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │    ┌────────────┘                 │
//!        │    │    ┌──────────────┐          │
//!        │    │    │ PointsLedger │◄─────────┤
//!        │    │    └──────┬───────┘          │
//!        ▼    ▼           ▼                  ▼
//! ┌──────────────────────────────────────────────────┐
//! │            Arc<dyn DocumentStore>                │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod confirmation;
pub mod error;
pub mod ledger;
pub mod pairing;
pub mod paths;
pub mod readiness;
pub mod retry;
pub mod types;

// Re-export main types
pub use confirmation::ConfirmationCoordinator;
pub use error::{CoreError, Result};
pub use ledger::PointsLedger;
pub use pairing::{PairingConfig, PairingCoordinator};
pub use readiness::{PairUpdates, ReadinessWatcher};
pub use retry::RetryPolicy;
pub use types::{
    ActionId, ActionRecord, ActionStatus, ConfirmOutcome, PairId, PairRecord, PairRole, PairState,
    PairingOutcome, ParticipantId, Slot, Standing, TaskCompletion, TopicId,
};
