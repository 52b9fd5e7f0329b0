//! Per-user point balances.

use std::sync::Arc;
use tracing::info;

use tandem_store::{DocumentStore, FieldOp, Fields, SetMode, StoreTransaction};

use crate::error::Result;
use crate::paths;
use crate::types::ParticipantId;

/// Field holding a user's balance.
pub const POINTS_FIELD: &str = "points";

const GRANTED_AT_FIELD: &str = "granted_at";

/// Authoritative per-user point balance.
///
/// Balances only ever change by atomic increments, which commute, so
/// concurrent grants from unrelated sources never lose updates. Reads
/// are eventually consistent with in-flight grants.
pub struct PointsLedger {
    store: Arc<dyn DocumentStore>,
}

impl PointsLedger {
    /// Create a ledger over a store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Grant points to a participant, creating the balance when absent.
    pub async fn grant(&self, participant: &ParticipantId, delta: i64) -> Result<()> {
        let path = paths::user(participant)?;
        self.store
            .update(
                &path,
                vec![(POINTS_FIELD.to_string(), FieldOp::Increment(delta))],
            )
            .await?;

        info!(participant = %participant, delta, "Points granted");
        Ok(())
    }

    /// Current balance; a missing entry reads as zero.
    pub async fn balance(&self, participant: &ParticipantId) -> Result<i64> {
        let path = paths::user(participant)?;
        let doc = self.store.get(&path).await?;
        Ok(doc.and_then(|d| d.i64_field(POINTS_FIELD)).unwrap_or(0))
    }

    /// Buffer a grant inside a caller's open transaction.
    pub fn credit(
        tx: &mut dyn StoreTransaction,
        participant: &ParticipantId,
        delta: i64,
    ) -> Result<()> {
        let path = paths::user(participant)?;
        tx.update(
            &path,
            vec![(POINTS_FIELD.to_string(), FieldOp::Increment(delta))],
        );
        Ok(())
    }

    /// Buffer a payout marker inside a caller's transaction.
    ///
    /// Marker presence is what keeps payout recovery idempotent per
    /// (source, participant).
    pub fn record_reward(
        tx: &mut dyn StoreTransaction,
        participant: &ParticipantId,
        source: &str,
        points: i64,
        granted_at: &str,
    ) -> Result<()> {
        let path = paths::reward(participant, source)?;
        let mut fields = Fields::new();
        fields.insert(POINTS_FIELD.to_string(), points.into());
        fields.insert(GRANTED_AT_FIELD.to_string(), granted_at.into());
        tx.set(&path, fields, SetMode::Overwrite);
        Ok(())
    }

    /// Whether a payout marker exists for the source.
    pub async fn reward_recorded(&self, participant: &ParticipantId, source: &str) -> Result<bool> {
        let path = paths::reward(participant, source)?;
        Ok(self.store.get(&path).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_store::MemoryStore;

    fn participant(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_grant_accumulates_from_missing_balance() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PointsLedger::new(store);
        let u1 = participant("u1");

        assert_eq!(ledger.balance(&u1).await.unwrap(), 0);
        ledger.grant(&u1, 60).await.unwrap();
        ledger.grant(&u1, -10).await.unwrap();
        assert_eq!(ledger.balance(&u1).await.unwrap(), 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_grants_all_land() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(PointsLedger::new(store));
        let u1 = participant("u1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            let u1 = u1.clone();
            handles.push(tokio::spawn(async move {
                ledger.grant(&u1, 5).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ledger.balance(&u1).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_credit_lands_with_the_enclosing_commit() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PointsLedger::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
        let u1 = participant("u1");

        let mut tx = store.begin().await.unwrap();
        PointsLedger::credit(tx.as_mut(), &u1, 25).unwrap();
        assert_eq!(ledger.balance(&u1).await.unwrap(), 0);

        tx.commit().await.unwrap();
        assert_eq!(ledger.balance(&u1).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_reward_marker_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let ledger = PointsLedger::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
        let u1 = participant("u1");

        assert!(!ledger.reward_recorded(&u1, "a1").await.unwrap());

        let mut tx = store.begin().await.unwrap();
        PointsLedger::record_reward(tx.as_mut(), &u1, "a1", 20, "2026-01-01T00:00:00Z").unwrap();
        tx.commit().await.unwrap();

        assert!(ledger.reward_recorded(&u1, "a1").await.unwrap());
        assert!(!ledger.reward_recorded(&u1, "a2").await.unwrap());
    }
}
