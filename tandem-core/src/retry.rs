//! Bounded retry for optimistic transactions.
//!
//! Every coordinator runs the same loop: open a transaction, read,
//! decide, buffer writes, commit. A conflict means another writer got
//! there first and the loop re-runs from a fresh read. [`Retry`] bounds
//! those attempts and owns the backoff between them.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Retry policy for transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum commit attempts before giving up
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly per attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Attempt tracking for one logical operation.
pub struct Retry {
    policy: RetryPolicy,
    operation: &'static str,
    attempt: u32,
}

impl Retry {
    /// Start tracking attempts for an operation.
    pub fn new(policy: RetryPolicy, operation: &'static str) -> Self {
        Self {
            policy,
            operation,
            attempt: 0,
        }
    }

    /// Record a conflicted attempt and back off before the next one.
    ///
    /// Fails with `RetriesExhausted` once the attempt budget is spent.
    pub async fn pause(&mut self) -> Result<()> {
        self.attempt += 1;
        if self.attempt >= self.policy.max_attempts {
            return Err(CoreError::RetriesExhausted {
                operation: self.operation,
                attempts: self.attempt,
            });
        }

        debug!(
            operation = self.operation,
            attempt = self.attempt,
            "Commit conflict, retrying"
        );
        tokio::time::sleep(self.policy.backoff * self.attempt).await;
        Ok(())
    }
}
