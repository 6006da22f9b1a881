//! Durable live-session records
//!
//! This module provides the `Session` row and the `SessionStore` seam:
//! - Creating a session when a host goes live
//! - Resolving a route reference (UUID or friendly slug) to a session
//! - The advisory viewer-count snapshot written by the presence tracker
//! - The end-of-session summary (link, duration, participant count)

mod store;

pub use store::{
    resolve, NewSession, Session, SessionEnd, SessionRef, SessionStatus, SessionStore,
};

use uuid::Uuid;

/// Opaque session identifier.
pub type SessionId = Uuid;

/// Stable identifier minted by the identity provider. All presence, reaction
/// and attendance keys depend on it being available before join.
pub type UserId = Uuid;
