//! Unanimous confirmation and exactly-once payout.
//!
//! An action completes when every enrolled participant has confirmed.
//! The deciding confirmation flips the status and pays all participants
//! in the same commit, so the status flip is the at-most-once gate for
//! payouts. Payout markers written alongside make recovery idempotent
//! for backends whose writes are less atomic.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use tandem_store::{DocumentStore, FieldOp, Fields, Filter, SetMode, StoreError};

use crate::error::{CoreError, Result};
use crate::ledger::PointsLedger;
use crate::paths;
use crate::retry::{Retry, RetryPolicy};
use crate::types::{
    action_fields, ActionId, ActionRecord, ActionStatus, ConfirmOutcome, ParticipantId, Standing,
    TopicId,
};

/// Collects confirmations and completes actions exactly once.
pub struct ConfirmationCoordinator {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl ConfirmationCoordinator {
    /// Create a coordinator with the default retry policy.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the transaction retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create a pending action for a topic.
    pub async fn create_action(
        &self,
        topic: &TopicId,
        text: impl Into<String>,
        points: i64,
        threshold: usize,
    ) -> Result<ActionId> {
        let text = text.into();
        let mut fields = Fields::new();
        fields.insert(action_fields::TEXT.to_string(), text.as_str().into());
        fields.insert(
            action_fields::PARTICIPANTS.to_string(),
            serde_json::json!([]),
        );
        fields.insert(
            action_fields::CONFIRMED_BY.to_string(),
            serde_json::json!([]),
        );
        fields.insert(
            action_fields::THRESHOLD.to_string(),
            (threshold as i64).into(),
        );
        fields.insert(action_fields::POINTS.to_string(), points.into());
        fields.insert(
            action_fields::STATUS.to_string(),
            ActionStatus::Pending.as_str().into(),
        );
        fields.insert(
            action_fields::CREATED_AT.to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );

        let path = self.store.add(&paths::actions(topic)?, fields).await?;
        let action = ActionId::new(path.id())?;
        info!(topic = %topic, action = %action, text = %text, "Action created");
        Ok(action)
    }

    /// Current state of an action.
    pub async fn action_record(&self, topic: &TopicId, action: &ActionId) -> Result<ActionRecord> {
        let doc = self
            .store
            .get(&paths::action(topic, action)?)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                kind: "action",
                id: action.to_string(),
            })?;
        ActionRecord::from_document(&doc)
    }

    /// Enroll the caller as a participant of a pending action.
    ///
    /// The membership union and the caller's enrollment log entry commit
    /// together. Enrolling twice is a no-op; enrolling into a completed
    /// action is rejected.
    pub async fn enroll(
        &self,
        topic: &TopicId,
        action: &ActionId,
        participant: &ParticipantId,
    ) -> Result<()> {
        let path = paths::action(topic, action)?;
        let mut retry = Retry::new(self.retry.clone(), "confirmation.enroll");

        loop {
            let mut tx = self.store.begin().await?;
            let doc = tx.get(&path).await?.ok_or_else(|| CoreError::NotFound {
                kind: "action",
                id: action.to_string(),
            })?;
            let record = ActionRecord::from_document(&doc)?;

            if record.status == ActionStatus::Completed {
                return Err(CoreError::ActionClosed(action.to_string()));
            }
            if record.has_participant(participant) {
                return Ok(());
            }

            tx.update(
                &path,
                vec![(
                    action_fields::PARTICIPANTS.to_string(),
                    FieldOp::ArrayUnion(vec![participant.as_str().into()]),
                )],
            );

            let mut log = Fields::new();
            log.insert("text".to_string(), record.text.as_str().into());
            log.insert("points".to_string(), record.points.into());
            log.insert("topic".to_string(), topic.as_str().into());
            log.insert(
                "recorded_at".to_string(),
                chrono::Utc::now().to_rfc3339().into(),
            );
            tx.set(&paths::enrollment(participant, action)?, log, SetMode::Overwrite);

            match tx.commit().await {
                Ok(()) => {
                    info!(action = %action, participant = %participant, "Enrolled");
                    return Ok(());
                }
                Err(StoreError::Conflict(_)) => retry.pause().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Record that the caller turned the action down.
    pub async fn decline(
        &self,
        topic: &TopicId,
        action: &ActionId,
        participant: &ParticipantId,
    ) -> Result<()> {
        let doc = self
            .store
            .get(&paths::action(topic, action)?)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                kind: "action",
                id: action.to_string(),
            })?;
        let record = ActionRecord::from_document(&doc)?;

        let mut log = Fields::new();
        log.insert("text".to_string(), record.text.as_str().into());
        log.insert("topic".to_string(), topic.as_str().into());
        log.insert(
            "recorded_at".to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );
        self.store
            .set(&paths::decline(participant, action)?, log, SetMode::Overwrite)
            .await?;

        debug!(action = %action, participant = %participant, "Declined");
        Ok(())
    }

    /// Record the caller's confirmation; completes the action and pays
    /// every participant when unanimity is reached.
    ///
    /// Runs as one transaction: the membership check, the confirmation
    /// union, and, on unanimity, the status flip plus every ledger
    /// increment and payout marker commit atomically or not at all.
    /// Confirming after completion is a no-op.
    pub async fn confirm(
        &self,
        topic: &TopicId,
        action: &ActionId,
        participant: &ParticipantId,
    ) -> Result<ConfirmOutcome> {
        let path = paths::action(topic, action)?;
        let mut retry = Retry::new(self.retry.clone(), "confirmation.confirm");

        loop {
            let mut tx = self.store.begin().await?;
            let doc = tx.get(&path).await?.ok_or_else(|| CoreError::NotFound {
                kind: "action",
                id: action.to_string(),
            })?;
            let record = ActionRecord::from_document(&doc)?;

            // Rejected without mutating anything.
            if !record.has_participant(participant) {
                return Err(CoreError::NotAParticipant {
                    participant: participant.to_string(),
                    record: action.to_string(),
                });
            }
            if record.status == ActionStatus::Completed {
                debug!(action = %action, participant = %participant, "Confirm after completion ignored");
                return Ok(ConfirmOutcome::AlreadyCompleted);
            }

            let mut confirmed_by = record.confirmed_by.clone();
            if !confirmed_by.contains(participant) {
                confirmed_by.push(participant.clone());
            }
            let awaiting = record
                .participants
                .iter()
                .filter(|p| !confirmed_by.contains(p))
                .count();

            if awaiting > 0 {
                // Re-confirming changes nothing; skip the write.
                if record.confirmed_by.contains(participant) {
                    return Ok(ConfirmOutcome::Recorded {
                        confirmed: confirmed_by.len(),
                        awaiting,
                    });
                }

                tx.update(
                    &path,
                    vec![(
                        action_fields::CONFIRMED_BY.to_string(),
                        FieldOp::ArrayUnion(vec![participant.as_str().into()]),
                    )],
                );

                match tx.commit().await {
                    Ok(()) => {
                        info!(action = %action, participant = %participant, confirmed = confirmed_by.len(), awaiting, "Confirmation recorded");
                        return Ok(ConfirmOutcome::Recorded {
                            confirmed: confirmed_by.len(),
                            awaiting,
                        });
                    }
                    Err(StoreError::Conflict(_)) => {
                        retry.pause().await?;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // Unanimity: flip the status and pay everyone in this commit.
            let now = chrono::Utc::now().to_rfc3339();
            tx.update(
                &path,
                vec![
                    (
                        action_fields::CONFIRMED_BY.to_string(),
                        FieldOp::ArrayUnion(vec![participant.as_str().into()]),
                    ),
                    (
                        action_fields::STATUS.to_string(),
                        FieldOp::Set(ActionStatus::Completed.as_str().into()),
                    ),
                    (
                        action_fields::COMPLETED_AT.to_string(),
                        FieldOp::Set(now.as_str().into()),
                    ),
                ],
            );

            for member in &record.participants {
                PointsLedger::credit(tx.as_mut(), member, record.points)?;
                PointsLedger::record_reward(
                    tx.as_mut(),
                    member,
                    action.as_str(),
                    record.points,
                    &now,
                )?;
            }

            match tx.commit().await {
                Ok(()) => {
                    info!(action = %action, participants = record.participants.len(), points = record.points, "Action completed, payouts dispatched");
                    return Ok(ConfirmOutcome::Completed {
                        points_each: record.points,
                        participants: record.participants.len(),
                    });
                }
                Err(StoreError::Conflict(_)) => retry.pause().await?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Re-drive missing payouts for a completed action.
    ///
    /// For backends whose commits cannot span the status flip and every
    /// payout, the markers identify who was actually paid. Each missing
    /// payout is granted in its own transaction conditioned on the
    /// marker's absence, so replays never pay twice. Returns how many
    /// payouts were repaired.
    pub async fn recover_payouts(&self, topic: &TopicId, action: &ActionId) -> Result<u32> {
        let record = self.action_record(topic, action).await?;
        if record.status != ActionStatus::Completed {
            return Ok(0);
        }

        let mut repaired = 0;
        for member in &record.participants {
            let marker = paths::reward(member, action.as_str())?;
            let mut retry = Retry::new(self.retry.clone(), "confirmation.recover_payouts");

            loop {
                let mut tx = self.store.begin().await?;
                if tx.get(&marker).await?.is_some() {
                    break;
                }

                let now = chrono::Utc::now().to_rfc3339();
                PointsLedger::credit(tx.as_mut(), member, record.points)?;
                PointsLedger::record_reward(
                    tx.as_mut(),
                    member,
                    action.as_str(),
                    record.points,
                    &now,
                )?;

                match tx.commit().await {
                    Ok(()) => {
                        repaired += 1;
                        info!(action = %action, participant = %member, points = record.points, "Missing payout repaired");
                        break;
                    }
                    Err(StoreError::Conflict(_)) => retry.pause().await?,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(repaired)
    }

    /// Per-participant totals over the topic's completed actions.
    pub async fn standings(&self, topic: &TopicId) -> Result<Vec<Standing>> {
        let filter = Filter::field(action_fields::STATUS, ActionStatus::Completed.as_str());
        let docs = self.store.query(&paths::actions(topic)?, &filter).await?;

        let mut totals: BTreeMap<ParticipantId, i64> = BTreeMap::new();
        for doc in &docs {
            let record = ActionRecord::from_document(doc)?;
            let points = record.points;
            for member in record.participants {
                *totals.entry(member).or_insert(0) += points;
            }
        }

        let mut standings: Vec<Standing> = totals
            .into_iter()
            .map(|(participant, points)| Standing {
                participant,
                points,
            })
            .collect();
        standings.sort_by(|a, b| b.points.cmp(&a.points));
        Ok(standings)
    }
}
