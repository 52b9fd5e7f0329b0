//! Pair matchmaking and task lifecycle.
//!
//! `join` never trusts a query result: slot claims are committed
//! conditionally on the slot still being open, so two joiners can race
//! for the same pair and exactly one wins. The loser re-queries and
//! either takes another open pair or opens a fresh one.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use tandem_store::{DocumentStore, FieldOp, Fields, Filter, StoreError};

use crate::error::{CoreError, Result};
use crate::ledger::PointsLedger;
use crate::paths;
use crate::retry::{Retry, RetryPolicy};
use crate::types::{
    pair_fields, PairId, PairRecord, PairRole, PairingOutcome, ParticipantId, TaskCompletion,
    TopicId, OPEN_SLOT,
};

use tandem_suggest::{SuggestionProvider, SuggestionRequest};

/// Pairing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Points granted to the giver on task completion
    pub giver_points: i64,
    /// Points granted to the receiver on task completion
    pub receiver_points: i64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            giver_points: 60,
            receiver_points: 40,
        }
    }
}

/// Finds or creates two-slot pairs and drives their task lifecycle.
pub struct PairingCoordinator {
    store: Arc<dyn DocumentStore>,
    suggestions: Arc<dyn SuggestionProvider>,
    config: PairingConfig,
    retry: RetryPolicy,
}

impl PairingCoordinator {
    /// Create a coordinator with default configuration.
    pub fn new(store: Arc<dyn DocumentStore>, suggestions: Arc<dyn SuggestionProvider>) -> Self {
        Self {
            store,
            suggestions,
            config: PairingConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Override the pairing configuration.
    pub fn with_config(mut self, config: PairingConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the transaction retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Join the caller into a pair for the topic.
    ///
    /// Re-joining is idempotent: a caller already holding a slot on an
    /// active pair gets that pair back. Otherwise the first active pair
    /// with an open slot is claimed; with none, a fresh pair is opened
    /// and the creator's role is a coin flip.
    pub async fn join(
        &self,
        topic: &TopicId,
        participant: &ParticipantId,
    ) -> Result<PairingOutcome> {
        let mut retry = Retry::new(self.retry.clone(), "pairing.join");

        loop {
            if let Some(outcome) = self.find_membership(topic, participant).await? {
                debug!(topic = %topic, participant = %participant, pair = %outcome.pair, "Rejoined existing pair");
                return Ok(outcome);
            }

            match self.find_open_pair(topic, participant).await? {
                Some(candidate) => {
                    match self.claim_slot(topic, &candidate, participant).await? {
                        Some(outcome) => {
                            info!(topic = %topic, participant = %participant, pair = %outcome.pair, role = ?outcome.role, "Joined pair");
                            return Ok(outcome);
                        }
                        // Lost the race; the pair may be full now or a
                        // new open one may have appeared.
                        None => retry.pause().await?,
                    }
                }
                None => {
                    let outcome = self.create_pair(topic, participant).await?;
                    info!(topic = %topic, participant = %participant, pair = %outcome.pair, role = ?outcome.role, "Opened new pair");
                    return Ok(outcome);
                }
            }
        }
    }

    /// Active pair the participant already occupies, if any.
    async fn find_membership(
        &self,
        topic: &TopicId,
        participant: &ParticipantId,
    ) -> Result<Option<PairingOutcome>> {
        let filter = Filter::all([
            Filter::field(pair_fields::ACTIVE, true),
            Filter::any([
                Filter::field(pair_fields::GIVER, participant.as_str()),
                Filter::field(pair_fields::RECEIVER, participant.as_str()),
            ]),
        ]);

        let docs = self.store.query(&paths::pairs(topic)?, &filter).await?;
        let Some(doc) = docs.first() else {
            return Ok(None);
        };

        let record = PairRecord::from_document(doc)?;
        let role = record
            .role_of(participant)
            .ok_or_else(|| CoreError::Malformed {
                path: doc.path.to_string(),
                reason: "query matched a pair the caller does not occupy".to_string(),
            })?;

        Ok(Some(PairingOutcome {
            partner: record.slot(role.other()).holder().cloned(),
            pair: record.id,
            role,
        }))
    }

    /// First active pair with an open slot the caller does not hold.
    async fn find_open_pair(
        &self,
        topic: &TopicId,
        participant: &ParticipantId,
    ) -> Result<Option<PairRecord>> {
        let filter = Filter::all([
            Filter::field(pair_fields::ACTIVE, true),
            Filter::any([
                Filter::field(pair_fields::GIVER, OPEN_SLOT),
                Filter::field(pair_fields::RECEIVER, OPEN_SLOT),
            ]),
        ]);

        let docs = self.store.query(&paths::pairs(topic)?, &filter).await?;
        for doc in &docs {
            let record = PairRecord::from_document(doc)?;
            if record.role_of(participant).is_none() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Claim an open slot on the candidate pair. Returns `None` when the
    /// race was lost and the caller should re-query.
    async fn claim_slot(
        &self,
        topic: &TopicId,
        candidate: &PairRecord,
        participant: &ParticipantId,
    ) -> Result<Option<PairingOutcome>> {
        let path = paths::pair(topic, &candidate.id)?;
        let mut tx = self.store.begin().await?;

        let Some(doc) = tx.get(&path).await? else {
            return Ok(None);
        };
        let current = PairRecord::from_document(&doc)?;

        if !current.active {
            return Ok(None);
        }
        if let Some(role) = current.role_of(participant) {
            // Another session of the same participant already claimed.
            return Ok(Some(PairingOutcome {
                partner: current.slot(role.other()).holder().cloned(),
                pair: current.id,
                role,
            }));
        }

        let role = if current.giver.is_open() {
            PairRole::Giver
        } else if current.receiver.is_open() {
            PairRole::Receiver
        } else {
            // Filled since the query.
            return Ok(None);
        };

        tx.update(
            &path,
            vec![(
                role.slot_field().to_string(),
                FieldOp::Set(participant.as_str().into()),
            )],
        );

        match tx.commit().await {
            Ok(()) => Ok(Some(PairingOutcome {
                partner: current.slot(role.other()).holder().cloned(),
                pair: current.id.clone(),
                role,
            })),
            Err(StoreError::Conflict(reason)) => {
                debug!(pair = %candidate.id, reason = %reason, "Slot claim lost the race");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a fresh pair; the creator's role is a uniform coin flip.
    async fn create_pair(
        &self,
        topic: &TopicId,
        participant: &ParticipantId,
    ) -> Result<PairingOutcome> {
        let role = if rand::thread_rng().gen_bool(0.5) {
            PairRole::Giver
        } else {
            PairRole::Receiver
        };

        let mut fields = Fields::new();
        fields.insert(role.slot_field().to_string(), participant.as_str().into());
        fields.insert(role.other().slot_field().to_string(), OPEN_SLOT.into());
        fields.insert(pair_fields::ACTIVE.to_string(), true.into());
        fields.insert(pair_fields::GIVER_ACCEPTED.to_string(), false.into());
        fields.insert(pair_fields::RECEIVER_ACCEPTED.to_string(), false.into());
        fields.insert(
            pair_fields::DECLINED_TASKS.to_string(),
            serde_json::json!([]),
        );
        fields.insert(
            pair_fields::CREATED_AT.to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );

        let path = self.store.add(&paths::pairs(topic)?, fields).await?;
        Ok(PairingOutcome {
            pair: PairId::new(path.id())?,
            role,
            partner: None,
        })
    }

    /// Current state of a pair.
    pub async fn pair_record(&self, topic: &TopicId, pair: &PairId) -> Result<PairRecord> {
        let doc = self
            .store
            .get(&paths::pair(topic, pair)?)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                kind: "pair",
                id: pair.to_string(),
            })?;
        PairRecord::from_document(&doc)
    }

    /// Record the caller's acceptance of the current task.
    pub async fn accept(
        &self,
        topic: &TopicId,
        pair: &PairId,
        participant: &ParticipantId,
    ) -> Result<()> {
        let path = paths::pair(topic, pair)?;
        let mut retry = Retry::new(self.retry.clone(), "pairing.accept");

        loop {
            let mut tx = self.store.begin().await?;
            let doc = tx.get(&path).await?.ok_or_else(|| CoreError::NotFound {
                kind: "pair",
                id: pair.to_string(),
            })?;
            let record = PairRecord::from_document(&doc)?;

            if !record.active {
                return Err(CoreError::PairClosed(pair.to_string()));
            }
            let role = record
                .role_of(participant)
                .ok_or_else(|| CoreError::NotAParticipant {
                    participant: participant.to_string(),
                    record: pair.to_string(),
                })?;
            if record.accepted(role) {
                return Ok(());
            }

            tx.update(
                &path,
                vec![(
                    role.accepted_field().to_string(),
                    FieldOp::Set(true.into()),
                )],
            );

            match tx.commit().await {
                Ok(()) => {
                    info!(pair = %pair, participant = %participant, role = ?role, "Task accepted");
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => retry.pause().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Current task of the pair, proposing one when absent.
    ///
    /// The proposal is committed conditionally on the task still being
    /// absent, so when two clients race the first proposal wins and both
    /// see it.
    pub async fn ensure_task(&self, topic: &TopicId, pair: &PairId) -> Result<String> {
        let path = paths::pair(topic, pair)?;

        let record = self.pair_record(topic, pair).await?;
        if let Some(task) = record.task {
            return Ok(task);
        }
        if !record.active {
            return Err(CoreError::PairClosed(pair.to_string()));
        }

        // The provider call stays outside the transaction; only the
        // write is conditioned.
        let request = SuggestionRequest::for_topic(topic.as_str())
            .with_declined_all(record.declined_tasks);
        let proposal = self.suggestions.propose(request).await?;

        let mut retry = Retry::new(self.retry.clone(), "pairing.ensure_task");
        loop {
            let mut tx = self.store.begin().await?;
            let doc = tx.get(&path).await?.ok_or_else(|| CoreError::NotFound {
                kind: "pair",
                id: pair.to_string(),
            })?;
            let current = PairRecord::from_document(&doc)?;

            if let Some(task) = current.task {
                debug!(pair = %pair, "Concurrent proposal won");
                return Ok(task);
            }
            if !current.active {
                return Err(CoreError::PairClosed(pair.to_string()));
            }

            tx.update(
                &path,
                vec![(
                    pair_fields::TASK.to_string(),
                    FieldOp::Set(proposal.as_str().into()),
                )],
            );

            match tx.commit().await {
                Ok(()) => {
                    info!(pair = %pair, task = %proposal, "Task proposed");
                    return Ok(proposal);
                }
                Err(StoreError::Conflict(_)) => retry.pause().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Replace the current task and clear both acceptance flags.
    ///
    /// The replaced task joins the pair's declined list so the provider
    /// avoids repeating it.
    pub async fn request_new_task(
        &self,
        topic: &TopicId,
        pair: &PairId,
        participant: &ParticipantId,
    ) -> Result<String> {
        let path = paths::pair(topic, pair)?;

        let record = self.pair_record(topic, pair).await?;
        if !record.active {
            return Err(CoreError::PairClosed(pair.to_string()));
        }
        if record.role_of(participant).is_none() {
            return Err(CoreError::NotAParticipant {
                participant: participant.to_string(),
                record: pair.to_string(),
            });
        }

        let mut declined = record.declined_tasks;
        if let Some(task) = record.task {
            if !declined.contains(&task) {
                declined.push(task);
            }
        }

        let request = SuggestionRequest::for_topic(topic.as_str()).with_declined_all(declined);
        let proposal = self.suggestions.propose(request).await?;

        let mut retry = Retry::new(self.retry.clone(), "pairing.request_new_task");
        loop {
            let mut tx = self.store.begin().await?;
            let doc = tx.get(&path).await?.ok_or_else(|| CoreError::NotFound {
                kind: "pair",
                id: pair.to_string(),
            })?;
            let current = PairRecord::from_document(&doc)?;
            if !current.active {
                return Err(CoreError::PairClosed(pair.to_string()));
            }

            let mut updates = vec![
                (
                    pair_fields::TASK.to_string(),
                    FieldOp::Set(proposal.as_str().into()),
                ),
                (
                    pair_fields::GIVER_ACCEPTED.to_string(),
                    FieldOp::Set(false.into()),
                ),
                (
                    pair_fields::RECEIVER_ACCEPTED.to_string(),
                    FieldOp::Set(false.into()),
                ),
            ];
            if let Some(task) = &current.task {
                updates.push((
                    pair_fields::DECLINED_TASKS.to_string(),
                    FieldOp::ArrayUnion(vec![task.as_str().into()]),
                ));
            }
            tx.update(&path, updates);

            match tx.commit().await {
                Ok(()) => {
                    info!(pair = %pair, participant = %participant, task = %proposal, "New task requested");
                    return Ok(proposal);
                }
                Err(StoreError::Conflict(_)) => retry.pause().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Confirm the pair's task, deactivate the pair, and pay both sides.
    ///
    /// Requires both acceptance flags. The deactivation, both ledger
    /// increments, and both payout markers commit atomically; calling
    /// again after completion is a no-op.
    pub async fn complete_task(
        &self,
        topic: &TopicId,
        pair: &PairId,
        participant: &ParticipantId,
    ) -> Result<TaskCompletion> {
        let path = paths::pair(topic, pair)?;
        let mut retry = Retry::new(self.retry.clone(), "pairing.complete_task");

        loop {
            let mut tx = self.store.begin().await?;
            let doc = tx.get(&path).await?.ok_or_else(|| CoreError::NotFound {
                kind: "pair",
                id: pair.to_string(),
            })?;
            let record = PairRecord::from_document(&doc)?;

            if record.role_of(participant).is_none() {
                return Err(CoreError::NotAParticipant {
                    participant: participant.to_string(),
                    record: pair.to_string(),
                });
            }
            if !record.active {
                return Ok(TaskCompletion::AlreadyCompleted);
            }
            if !record.mutually_accepted() {
                return Err(CoreError::NotAccepted(pair.to_string()));
            }
            let (Some(giver), Some(receiver)) = (record.giver.holder(), record.receiver.holder())
            else {
                return Err(CoreError::Malformed {
                    path: path.to_string(),
                    reason: "accepted pair with an open slot".to_string(),
                });
            };

            let now = chrono::Utc::now().to_rfc3339();
            tx.update(
                &path,
                vec![
                    (pair_fields::ACTIVE.to_string(), FieldOp::Set(false.into())),
                    (
                        pair_fields::COMPLETED_AT.to_string(),
                        FieldOp::Set(now.as_str().into()),
                    ),
                ],
            );

            PointsLedger::credit(tx.as_mut(), giver, self.config.giver_points)?;
            PointsLedger::credit(tx.as_mut(), receiver, self.config.receiver_points)?;
            PointsLedger::record_reward(
                tx.as_mut(),
                giver,
                pair.as_str(),
                self.config.giver_points,
                &now,
            )?;
            PointsLedger::record_reward(
                tx.as_mut(),
                receiver,
                pair.as_str(),
                self.config.receiver_points,
                &now,
            )?;

            match tx.commit().await {
                Ok(()) => {
                    info!(pair = %pair, giver = %giver, receiver = %receiver, "Task completed and paid");
                    return Ok(TaskCompletion::Completed {
                        giver_points: self.config.giver_points,
                        receiver_points: self.config.receiver_points,
                    });
                }
                Err(StoreError::Conflict(_)) => retry.pause().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_store::MemoryStore;
    use tandem_suggest::ScriptedSuggestions;

    fn setup() -> (Arc<MemoryStore>, PairingCoordinator) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = PairingCoordinator::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::new(ScriptedSuggestions::new("Write a kind note.")),
        );
        (store, coordinator)
    }

    #[test]
    fn test_default_config_splits_sixty_forty() {
        let config = PairingConfig::default();
        assert_eq!(config.giver_points, 60);
        assert_eq!(config.receiver_points, 40);
    }

    #[tokio::test]
    async fn test_create_pair_fills_exactly_one_slot() {
        let (store, coordinator) = setup();
        let topic = TopicId::new("t1").unwrap();
        let u1 = ParticipantId::new("u1").unwrap();

        let outcome = coordinator.join(&topic, &u1).await.unwrap();
        assert!(outcome.partner.is_none());

        let doc = store
            .get(&paths::pair(&topic, &outcome.pair).unwrap())
            .await
            .unwrap()
            .unwrap();
        let record = PairRecord::from_document(&doc).unwrap();

        assert!(record.active);
        assert_eq!(record.role_of(&u1), Some(outcome.role));
        assert!(record.slot(outcome.role.other()).is_open());
        assert!(!record.giver_accepted && !record.receiver_accepted);
    }

    #[tokio::test]
    async fn test_ensure_task_is_stable_across_calls() {
        let (_store, coordinator) = setup();
        let topic = TopicId::new("t1").unwrap();
        let u1 = ParticipantId::new("u1").unwrap();

        let outcome = coordinator.join(&topic, &u1).await.unwrap();
        let first = coordinator.ensure_task(&topic, &outcome.pair).await.unwrap();
        let second = coordinator.ensure_task(&topic, &outcome.pair).await.unwrap();
        assert_eq!(first, "Write a kind note.");
        assert_eq!(first, second);
    }
}
