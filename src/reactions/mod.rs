//! Per-user reactions with optimistic counters
//!
//! A reaction is a *state*, not an event log: at most one row per
//! (session, user), toggled off by selecting the same kind again. The
//! aggregator keeps per-kind counters live through a delta algebra applied
//! to both the local optimistic path and the remote change stream, so the
//! counts stay consistent without recounting on every event.

mod aggregator;
mod store;

pub use aggregator::{ReactionAggregator, ReactionCounts};
pub use store::{ReactionRow, ReactionStore};

use serde::{Deserialize, Serialize};

/// The reaction palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Heart,
    Wow,
    Like,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 3] = [ReactionKind::Heart, ReactionKind::Wow, ReactionKind::Like];
}
