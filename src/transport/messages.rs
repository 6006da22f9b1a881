use serde::{Deserialize, Serialize};

use crate::reactions::ReactionKind;
use crate::session::{SessionId, UserId};

/// Heartbeat published on `presence.session-{id}`.
///
/// A member is considered live while beats keep arriving; a beat with
/// `leaving` set departs immediately.
#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceBeat {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub at: String, // RFC3339 timestamp
    #[serde(default)]
    pub leaving: bool,
}

/// One reaction row as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRowMessage {
    pub session_id: SessionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: ReactionKind,
}

/// Row-change fan-out published on `rowchange.reactions.session-{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReactionChangeMessage {
    pub op: ChangeOp,
    pub old: Option<ReactionRowMessage>,
    pub new: Option<ReactionRowMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}
