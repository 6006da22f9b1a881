//! Realtime channel transport
//!
//! The core depends on exactly two transport primitives:
//! - a presence/heartbeat channel with synchronized membership snapshots
//! - a row-change event stream filterable by session
//!
//! `NatsTransport` is the production implementation; the in-memory backend
//! in [`crate::memory`] implements the same seam for tests and local use.

pub mod messages;
mod nats;

pub use nats::{NatsTransport, NatsTransportConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::reactions::ReactionRow;
use crate::session::{SessionId, UserId};

/// A synchronized view of who is live in a session right now.
///
/// Always a full member set, never a delta: the visible viewer count is the
/// cardinality of this set at any instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub members: BTreeSet<UserId>,
    pub at: DateTime<Utc>,
}

impl MembershipSnapshot {
    pub fn empty() -> Self {
        Self {
            members: BTreeSet::new(),
            at: Utc::now(),
        }
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }
}

/// A row-change event on the reaction table, scoped to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionEvent {
    Insert(ReactionRow),
    Update { old: ReactionRow, new: ReactionRow },
    Delete(ReactionRow),
}

impl ReactionEvent {
    /// The user the event is attributed to.
    pub fn user_id(&self) -> UserId {
        match self {
            ReactionEvent::Insert(row) | ReactionEvent::Delete(row) => row.user_id,
            ReactionEvent::Update { new, .. } => new.user_id,
        }
    }
}

/// An open presence membership for one (session, user).
///
/// Dropping the subscription without calling `leave()` models an abrupt
/// disconnect: heartbeats stop and the membership lapses after the expiry
/// window. `leave()` departs immediately and is idempotent.
#[async_trait]
pub trait PresenceSubscription: Send {
    /// Next membership snapshot, or `None` when the channel is lost.
    async fn next(&mut self) -> Option<MembershipSnapshot>;

    async fn leave(&mut self);
}

/// The transport seam consumed by the presence tracker and the reaction
/// aggregator. Implementations own the wire protocol; the core does not.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn join_presence(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Box<dyn PresenceSubscription>, ChannelError>;

    async fn reaction_events(
        &self,
        session_id: SessionId,
    ) -> Result<mpsc::Receiver<ReactionEvent>, ChannelError>;
}
