//! Persisted collection layout.
//!
//! ```text
//! topics/{topic}/pairs/{pair}
//! topics/{topic}/actions/{action}
//! users/{participant}
//! users/{participant}/rewards/{source}
//! users/{participant}/enrollments/{action}
//! users/{participant}/declines/{action}
//! ```

use tandem_store::{CollectionPath, DocPath};

use crate::error::Result;
use crate::types::{ActionId, PairId, ParticipantId, TopicId};

/// Pairs collection of a topic.
pub fn pairs(topic: &TopicId) -> Result<CollectionPath> {
    Ok(CollectionPath::parse(format!("topics/{}/pairs", topic))?)
}

/// A single pair document.
pub fn pair(topic: &TopicId, pair: &PairId) -> Result<DocPath> {
    Ok(pairs(topic)?.doc(pair.as_str())?)
}

/// Actions collection of a topic.
pub fn actions(topic: &TopicId) -> Result<CollectionPath> {
    Ok(CollectionPath::parse(format!("topics/{}/actions", topic))?)
}

/// A single action document.
pub fn action(topic: &TopicId, action: &ActionId) -> Result<DocPath> {
    Ok(actions(topic)?.doc(action.as_str())?)
}

/// A participant's ledger document.
pub fn user(participant: &ParticipantId) -> Result<DocPath> {
    Ok(DocPath::parse(format!("users/{}", participant))?)
}

/// Payout marker for one source (a pair or an action) and participant.
pub fn reward(participant: &ParticipantId, source: &str) -> Result<DocPath> {
    Ok(user(participant)?.collection("rewards")?.doc(source)?)
}

/// A participant's enrollment log entry.
pub fn enrollment(participant: &ParticipantId, action: &ActionId) -> Result<DocPath> {
    Ok(user(participant)?
        .collection("enrollments")?
        .doc(action.as_str())?)
}

/// A participant's decline log entry.
pub fn decline(participant: &ParticipantId, action: &ActionId) -> Result<DocPath> {
    Ok(user(participant)?
        .collection("declines")?
        .doc(action.as_str())?)
}
