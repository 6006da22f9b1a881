use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::aggregator::ReactionCounts;
use super::ReactionKind;
use crate::error::StoreError;
use crate::session::{SessionId, UserId};

/// One durable reaction row, keyed by (session, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRow {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub kind: ReactionKind,
}

/// Row store seam for reactions. Backends must support upsert by the
/// (session, user) composite key so rapid re-reactions never duplicate rows.
#[async_trait]
pub trait ReactionStore: Send + Sync {
    async fn upsert(&self, row: ReactionRow) -> Result<(), StoreError>;

    async fn delete(&self, session_id: SessionId, user_id: UserId) -> Result<(), StoreError>;

    /// Full recount per kind. Used on initial load only; afterwards the
    /// aggregator maintains counts from the change stream.
    async fn counts(&self, session_id: SessionId) -> Result<ReactionCounts, StoreError>;

    /// The caller's own active reaction, if any.
    async fn reaction_of(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<ReactionKind>, StoreError>;
}
