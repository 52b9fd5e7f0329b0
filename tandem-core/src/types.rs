//! Core record types for pairing and confirmation.
//!
//! Records are decoded from raw documents rather than deserialized, so
//! one malformed field degrades to a per-record error instead of
//! poisoning a whole query.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use tandem_store::Document;

use crate::error::{CoreError, Result};

/// Reserved slot value meaning "unclaimed".
pub const OPEN_SLOT: &str = "open";

fn check_id(kind: &'static str, id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') {
        return Err(CoreError::InvalidIdentifier {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Stable identifier for a participant, supplied by the caller's
/// identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant id, rejecting empty values, path separators,
    /// and the reserved open-slot sentinel.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        check_id("participant", &id)?;
        if id == OPEN_SLOT {
            return Err(CoreError::InvalidIdentifier {
                kind: "participant",
                id,
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a topic participants gather around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    /// Create a topic id, rejecting empty values and path separators.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        check_id("topic", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a pair document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct PairId(String);

impl PairId {
    /// Create a pair id, rejecting empty values and path separators.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        check_id("pair", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of an action document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Create an action id, rejecting empty values and path separators.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        check_id("action", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pair document field names.
pub mod pair_fields {
    pub const GIVER: &str = "giver";
    pub const RECEIVER: &str = "receiver";
    pub const ACTIVE: &str = "active";
    pub const GIVER_ACCEPTED: &str = "giver_accepted";
    pub const RECEIVER_ACCEPTED: &str = "receiver_accepted";
    pub const TASK: &str = "task";
    pub const DECLINED_TASKS: &str = "declined_tasks";
    pub const CREATED_AT: &str = "created_at";
    pub const COMPLETED_AT: &str = "completed_at";
}

/// Action document field names.
pub mod action_fields {
    pub const TEXT: &str = "text";
    pub const PARTICIPANTS: &str = "participants";
    pub const CONFIRMED_BY: &str = "confirmed_by";
    pub const THRESHOLD: &str = "threshold";
    pub const POINTS: &str = "points";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "created_at";
    pub const COMPLETED_AT: &str = "completed_at";
}

/// Which side of a pair a participant holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum PairRole {
    /// Performs the task for the receiver
    Giver,
    /// Receives the task
    Receiver,
}

impl PairRole {
    /// The opposite role.
    pub fn other(self) -> Self {
        match self {
            PairRole::Giver => PairRole::Receiver,
            PairRole::Receiver => PairRole::Giver,
        }
    }

    /// Field holding this role's slot.
    pub(crate) fn slot_field(self) -> &'static str {
        match self {
            PairRole::Giver => pair_fields::GIVER,
            PairRole::Receiver => pair_fields::RECEIVER,
        }
    }

    /// Field holding this role's acceptance flag.
    pub(crate) fn accepted_field(self) -> &'static str {
        match self {
            PairRole::Giver => pair_fields::GIVER_ACCEPTED,
            PairRole::Receiver => pair_fields::RECEIVER_ACCEPTED,
        }
    }
}

/// One participant position in a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Unclaimed
    Open,
    /// Claimed by a participant
    Held(ParticipantId),
}

impl Slot {
    /// Whether the slot is unclaimed.
    pub fn is_open(&self) -> bool {
        matches!(self, Slot::Open)
    }

    /// The holder, if claimed.
    pub fn holder(&self) -> Option<&ParticipantId> {
        match self {
            Slot::Open => None,
            Slot::Held(id) => Some(id),
        }
    }
}

fn slot_from(doc: &Document, field: &'static str) -> Result<Slot> {
    let value = doc.str_field(field).ok_or_else(|| CoreError::Malformed {
        path: doc.path.to_string(),
        reason: format!("missing slot field '{}'", field),
    })?;
    if value == OPEN_SLOT {
        return Ok(Slot::Open);
    }
    ParticipantId::new(value)
        .map(Slot::Held)
        .map_err(|_| CoreError::Malformed {
            path: doc.path.to_string(),
            reason: format!("bad participant in '{}'", field),
        })
}

/// Decoded view of a pair document.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRecord {
    /// Document id of the pair
    pub id: PairId,
    /// Giver slot
    pub giver: Slot,
    /// Receiver slot
    pub receiver: Slot,
    /// Whether the pair is live
    pub active: bool,
    /// Giver agreed to the current task
    pub giver_accepted: bool,
    /// Receiver agreed to the current task
    pub receiver_accepted: bool,
    /// Current proposed task
    pub task: Option<String>,
    /// Tasks this pair turned down
    pub declined_tasks: Vec<String>,
}

impl PairRecord {
    /// Decode a pair document. Acceptance flags read as false when the
    /// fields are absent; the readiness watcher heals the stored record.
    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(Self {
            id: PairId::new(doc.path.id())?,
            giver: slot_from(doc, pair_fields::GIVER)?,
            receiver: slot_from(doc, pair_fields::RECEIVER)?,
            active: doc.bool_field(pair_fields::ACTIVE).unwrap_or(false),
            giver_accepted: doc.bool_field(pair_fields::GIVER_ACCEPTED).unwrap_or(false),
            receiver_accepted: doc
                .bool_field(pair_fields::RECEIVER_ACCEPTED)
                .unwrap_or(false),
            task: doc.str_field(pair_fields::TASK).map(String::from),
            declined_tasks: doc.str_array(pair_fields::DECLINED_TASKS),
        })
    }

    /// Role held by the participant, if any.
    pub fn role_of(&self, participant: &ParticipantId) -> Option<PairRole> {
        if self.giver.holder() == Some(participant) {
            Some(PairRole::Giver)
        } else if self.receiver.holder() == Some(participant) {
            Some(PairRole::Receiver)
        } else {
            None
        }
    }

    /// Slot for a role.
    pub fn slot(&self, role: PairRole) -> &Slot {
        match role {
            PairRole::Giver => &self.giver,
            PairRole::Receiver => &self.receiver,
        }
    }

    /// Acceptance flag for a role.
    pub fn accepted(&self, role: PairRole) -> bool {
        match role {
            PairRole::Giver => self.giver_accepted,
            PairRole::Receiver => self.receiver_accepted,
        }
    }

    /// Whether both slots are claimed.
    pub fn is_ready(&self) -> bool {
        !self.giver.is_open() && !self.receiver.is_open()
    }

    /// Whether both sides accepted the current task.
    pub fn mutually_accepted(&self) -> bool {
        self.giver_accepted && self.receiver_accepted
    }
}

/// Snapshot emitted for a ready pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PairState {
    /// Pair id
    pub pair: PairId,
    /// Giver participant
    pub giver: ParticipantId,
    /// Receiver participant
    pub receiver: ParticipantId,
    /// Giver accepted the current task
    pub giver_accepted: bool,
    /// Receiver accepted the current task
    pub receiver_accepted: bool,
    /// Current proposed task
    pub task: Option<String>,
}

impl PairState {
    /// Whether both sides accepted.
    pub fn mutually_accepted(&self) -> bool {
        self.giver_accepted && self.receiver_accepted
    }

    /// Role of the participant, if part of this pair.
    pub fn role_of(&self, participant: &ParticipantId) -> Option<PairRole> {
        if &self.giver == participant {
            Some(PairRole::Giver)
        } else if &self.receiver == participant {
            Some(PairRole::Receiver)
        } else {
            None
        }
    }
}

/// Lifecycle status of an action. Pending to completed is the only
/// transition and happens at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Completed,
}

impl ActionStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Completed => "completed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ActionStatus::Pending),
            "completed" => Some(ActionStatus::Completed),
            _ => None,
        }
    }
}

/// Decoded view of an action document.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Document id of the action
    pub id: ActionId,
    /// What the participants agreed to do
    pub text: String,
    /// Enrolled participants
    pub participants: Vec<ParticipantId>,
    /// Participants who confirmed completion
    pub confirmed_by: Vec<ParticipantId>,
    /// Minimum enrollment before confirmation is offered
    pub threshold: usize,
    /// Points granted to every participant on completion
    pub points: i64,
    /// Lifecycle status
    pub status: ActionStatus,
}

impl ActionRecord {
    /// Decode an action document. A missing status reads as pending; an
    /// unrecognized one is malformed.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let status = match doc.str_field(action_fields::STATUS) {
            None => ActionStatus::Pending,
            Some(raw) => ActionStatus::parse(raw).ok_or_else(|| CoreError::Malformed {
                path: doc.path.to_string(),
                reason: format!("unknown status '{}'", raw),
            })?,
        };

        Ok(Self {
            id: ActionId::new(doc.path.id())?,
            text: doc
                .str_field(action_fields::TEXT)
                .unwrap_or_default()
                .to_string(),
            participants: decode_participants(doc, action_fields::PARTICIPANTS)?,
            confirmed_by: decode_participants(doc, action_fields::CONFIRMED_BY)?,
            threshold: doc
                .i64_field(action_fields::THRESHOLD)
                .unwrap_or(0)
                .max(0) as usize,
            points: doc.i64_field(action_fields::POINTS).unwrap_or(0),
            status,
        })
    }

    /// Participants who have not confirmed yet.
    pub fn awaiting(&self) -> Vec<&ParticipantId> {
        self.participants
            .iter()
            .filter(|p| !self.confirmed_by.contains(p))
            .collect()
    }

    /// Whether the participant is enrolled.
    pub fn has_participant(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }
}

fn decode_participants(doc: &Document, field: &'static str) -> Result<Vec<ParticipantId>> {
    doc.str_array(field)
        .into_iter()
        .map(|raw| {
            ParticipantId::new(raw.as_str()).map_err(|_| CoreError::Malformed {
                path: doc.path.to_string(),
                reason: format!("bad participant '{}' in '{}'", raw, field),
            })
        })
        .collect()
}

/// Result of a join call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PairingOutcome {
    /// Pair the caller occupies
    pub pair: PairId,
    /// Role the caller holds
    pub role: PairRole,
    /// The other participant, when that slot is claimed
    pub partner: Option<ParticipantId>,
}

/// Result of a confirm call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// Confirmation recorded; unanimity not reached yet
    Recorded {
        /// Confirmations so far
        confirmed: usize,
        /// Participants still missing
        awaiting: usize,
    },
    /// This confirmation reached unanimity and paid every participant
    Completed {
        /// Points granted to each participant
        points_each: i64,
        /// Number of participants paid
        participants: usize,
    },
    /// The action was already completed; nothing changed
    AlreadyCompleted,
}

/// Result of completing a pair's task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TaskCompletion {
    /// The pair was deactivated and both sides were paid
    Completed {
        /// Points granted to the giver
        giver_points: i64,
        /// Points granted to the receiver
        receiver_points: i64,
    },
    /// The pair was already completed; nothing changed
    AlreadyCompleted,
}

/// One row of a topic's standings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Standing {
    /// Participant
    pub participant: ParticipantId,
    /// Total points from the topic's completed actions
    pub points: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tandem_store::{DocPath, Fields};

    fn pair_doc(fields: Fields) -> Document {
        Document {
            path: DocPath::parse("topics/t1/pairs/p1").unwrap(),
            fields,
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_participant_id_rejects_reserved_values() {
        assert!(ParticipantId::new("u1").is_ok());
        assert!(ParticipantId::new("").is_err());
        assert!(ParticipantId::new("open").is_err());
        assert!(ParticipantId::new("a/b").is_err());
    }

    #[test]
    fn test_pair_record_decodes_and_defaults() {
        let doc = pair_doc(Fields::from([
            ("giver".to_string(), json!("u1")),
            ("receiver".to_string(), json!("open")),
            ("active".to_string(), json!(true)),
        ]));

        let record = PairRecord::from_document(&doc).unwrap();
        assert_eq!(record.id.as_str(), "p1");
        assert_eq!(
            record.giver.holder().map(ParticipantId::as_str),
            Some("u1")
        );
        assert!(record.receiver.is_open());
        assert!(record.active);
        // Absent flags default to false.
        assert!(!record.giver_accepted);
        assert!(!record.receiver_accepted);
        assert!(record.task.is_none());
        assert!(!record.is_ready());
    }

    #[test]
    fn test_pair_record_missing_slot_is_malformed() {
        let doc = pair_doc(Fields::from([("giver".to_string(), json!("u1"))]));
        assert!(matches!(
            PairRecord::from_document(&doc),
            Err(CoreError::Malformed { .. })
        ));
    }

    #[test]
    fn test_role_lookup() {
        let u1 = ParticipantId::new("u1").unwrap();
        let u2 = ParticipantId::new("u2").unwrap();
        let outsider = ParticipantId::new("u3").unwrap();

        let doc = pair_doc(Fields::from([
            ("giver".to_string(), json!("u1")),
            ("receiver".to_string(), json!("u2")),
            ("active".to_string(), json!(true)),
        ]));
        let record = PairRecord::from_document(&doc).unwrap();

        assert_eq!(record.role_of(&u1), Some(PairRole::Giver));
        assert_eq!(record.role_of(&u2), Some(PairRole::Receiver));
        assert_eq!(record.role_of(&outsider), None);
        assert!(record.is_ready());
    }

    #[test]
    fn test_action_record_decodes() {
        let doc = Document {
            path: DocPath::parse("topics/t1/actions/a1").unwrap(),
            fields: Fields::from([
                ("text".to_string(), json!("Clean the park")),
                ("participants".to_string(), json!(["u1", "u2"])),
                ("confirmed_by".to_string(), json!(["u1"])),
                ("threshold".to_string(), json!(2)),
                ("points".to_string(), json!(20)),
                ("status".to_string(), json!("pending")),
            ]),
            revision: 1,
            updated_at: Utc::now(),
        };

        let record = ActionRecord::from_document(&doc).unwrap();
        assert_eq!(record.text, "Clean the park");
        assert_eq!(record.participants.len(), 2);
        assert_eq!(record.threshold, 2);
        assert_eq!(record.status, ActionStatus::Pending);

        let awaiting = record.awaiting();
        assert_eq!(awaiting.len(), 1);
        assert_eq!(awaiting[0].as_str(), "u2");
    }

    #[test]
    fn test_action_record_unknown_status_is_malformed() {
        let doc = Document {
            path: DocPath::parse("topics/t1/actions/a1").unwrap(),
            fields: Fields::from([("status".to_string(), json!("paused"))]),
            revision: 1,
            updated_at: Utc::now(),
        };
        assert!(matches!(
            ActionRecord::from_document(&doc),
            Err(CoreError::Malformed { .. })
        ));
    }
}
