//! Pair readiness notifications.
//!
//! Turns the store's document subscription into a stream of [`PairState`]
//! snapshots that only ever describe a ready pair, meaning both slots
//! claimed. Because the gate inspects current field values only, a
//! subscriber never sees a ready pair reported as unready again; stale
//! or half-filled snapshots are suppressed, and later acceptance or task
//! changes arrive as fresh states.

use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tandem_store::{DocPath, Document, DocumentStore, DocumentWatch, FieldOp, StoreError};

use crate::error::Result;
use crate::paths;
use crate::types::{pair_fields, PairId, PairRecord, PairState, TopicId};

/// Buffered states per subscription.
const CHANNEL_CAPACITY: usize = 8;

/// Emits ready-pair snapshots for subscribers.
pub struct ReadinessWatcher {
    store: Arc<dyn DocumentStore>,
}

impl ReadinessWatcher {
    /// Create a watcher over a store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Subscribe to a pair's readiness.
    ///
    /// The stream yields a state as soon as both slots are claimed,
    /// immediately when that is already true, then again whenever an
    /// acceptance flag or the task changes. Consecutive identical states
    /// are suppressed. Dropping the stream unsubscribes.
    pub async fn watch(&self, topic: &TopicId, pair: &PairId) -> Result<PairUpdates> {
        let path = paths::pair(topic, pair)?;
        let source = self.store.watch(&path).await?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let store = Arc::clone(&self.store);
        let pair = pair.clone();
        tokio::spawn(async move {
            drive(store, source, path, pair, tx).await;
        });

        Ok(PairUpdates { receiver: rx })
    }
}

/// Consume store snapshots and forward deduplicated ready states.
async fn drive(
    store: Arc<dyn DocumentStore>,
    mut source: DocumentWatch,
    path: DocPath,
    pair: PairId,
    tx: mpsc::Sender<PairState>,
) {
    let mut last: Option<PairState> = None;

    while let Some(snapshot) = source.next().await {
        let Some(doc) = snapshot else {
            continue;
        };

        let record = match PairRecord::from_document(&doc) {
            Ok(record) => record,
            Err(e) => {
                warn!(pair = %pair, error = %e, "Undecodable pair snapshot skipped");
                continue;
            }
        };

        // Ready gate: both slots claimed.
        let (Some(giver), Some(receiver)) = (record.giver.holder(), record.receiver.holder())
        else {
            continue;
        };

        // Records written before the acceptance flags existed lack the
        // fields; backfill so every reader sees explicit values.
        if !doc.has_field(pair_fields::GIVER_ACCEPTED)
            || !doc.has_field(pair_fields::RECEIVER_ACCEPTED)
        {
            heal_acceptance(store.as_ref(), &path, &doc).await;
        }

        let state = PairState {
            pair: record.id.clone(),
            giver: giver.clone(),
            receiver: receiver.clone(),
            giver_accepted: record.giver_accepted,
            receiver_accepted: record.receiver_accepted,
            task: record.task.clone(),
        };

        if last.as_ref() == Some(&state) {
            continue;
        }
        last = Some(state.clone());

        if tx.send(state).await.is_err() {
            // Subscriber dropped the stream.
            break;
        }
    }

    debug!(pair = %pair, "Readiness subscription closed");
}

/// Write missing acceptance flags as false, conditioned on them still
/// being absent at commit. Losing that race means another client healed
/// the record first; its state arrives as a later snapshot.
async fn heal_acceptance(store: &dyn DocumentStore, path: &DocPath, doc: &Document) {
    let mut missing = Vec::new();
    if !doc.has_field(pair_fields::GIVER_ACCEPTED) {
        missing.push((
            pair_fields::GIVER_ACCEPTED.to_string(),
            FieldOp::Set(false.into()),
        ));
    }
    if !doc.has_field(pair_fields::RECEIVER_ACCEPTED) {
        missing.push((
            pair_fields::RECEIVER_ACCEPTED.to_string(),
            FieldOp::Set(false.into()),
        ));
    }

    let heal = async {
        let mut tx = store.begin().await?;
        let Some(current) = tx.get(path).await? else {
            return Ok(());
        };
        let still_missing: Vec<_> = missing
            .iter()
            .filter(|(field, _)| !current.has_field(field))
            .cloned()
            .collect();
        if still_missing.is_empty() {
            return Ok(());
        }
        tx.update(path, still_missing);
        tx.commit().await
    };

    match heal.await {
        Ok(()) => debug!(path = %path, "Acceptance flags healed"),
        Err(StoreError::Conflict(_)) => debug!(path = %path, "Acceptance flags healed elsewhere"),
        Err(e) => warn!(path = %path, error = %e, "Acceptance heal failed"),
    }
}

pin_project! {
    /// Stream of ready-pair states for one subscription.
    pub struct PairUpdates {
        #[pin]
        receiver: mpsc::Receiver<PairState>,
    }
}

impl PairUpdates {
    /// Next state, or `None` once the subscription ends.
    pub async fn next_state(&mut self) -> Option<PairState> {
        self.receiver.recv().await
    }
}

impl Stream for PairUpdates {
    type Item = PairState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().receiver.poll_recv(cx)
    }
}
