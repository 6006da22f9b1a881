//! Heartbeat-based presence tracking
//!
//! The viewer count for a session is the cardinality of the live member set,
//! never a running sum of +1/-1 deltas: deltas drift under disconnects,
//! membership does not. The tracker also write-throughs a debounced,
//! strictly advisory count snapshot to the session store for readers that
//! cannot watch presence directly.

mod tracker;

pub use tracker::{PresenceConfig, PresenceHandle, PresenceTracker};
