use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SessionId, UserId};
use crate::error::StoreError;

/// Lifecycle status of a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Live,
    Ended,
}

/// A durable live-session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// The client that created the session.
    pub host_id: Option<UserId>,

    /// Friendly route entry (e.g. "warmup-monday"), unique when present.
    pub slug: Option<String>,

    pub title: String,

    pub status: SessionStatus,

    /// Best-effort denormalized cache written by the presence tracker.
    /// Never ground truth; subscribe to presence for the live count.
    pub viewer_snapshot: u32,

    /// Retrieval link for the finished recording, set when the session ends.
    pub session_link: Option<String>,

    /// Final recording duration in seconds, set when the session ends.
    pub duration_secs: Option<u64>,

    /// Distinct attendee count, set when the session ends.
    pub participants: Option<u64>,

    pub created_at: DateTime<Utc>,
}

/// Fields for creating a session row.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub host_id: Option<UserId>,
    pub slug: Option<String>,
    pub title: String,
}

/// End-of-session summary written once when the host stops.
#[derive(Debug, Clone, Default)]
pub struct SessionEnd {
    pub session_link: Option<String>,
    pub duration_secs: Option<u64>,
    pub participants: Option<u64>,
}

/// A route-level reference to a session: either the UUID itself or a slug.
#[derive(Debug, Clone)]
pub enum SessionRef {
    Id(SessionId),
    Slug(String),
}

/// Row store seam for live sessions.
///
/// Backends must support plain update for the advisory snapshot; everything
/// stronger (presence, reactions) lives on the realtime side.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session row with status `Live`.
    async fn create(&self, new: NewSession) -> Result<Session, StoreError>;

    async fn get(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Session>, StoreError>;

    /// Currently-live sessions, newest first.
    async fn list_live(&self, limit: usize) -> Result<Vec<Session>, StoreError>;

    /// Advisory write-through of the presence cardinality. Readers that can
    /// subscribe to presence directly must never treat this as authoritative.
    async fn update_viewer_snapshot(&self, id: SessionId, count: u32) -> Result<(), StoreError>;

    /// Mark the session ended and record the summary.
    async fn end(&self, id: SessionId, summary: SessionEnd) -> Result<(), StoreError>;
}

/// Resolve a UUID-or-slug reference to a full session row, creating a row
/// for an unknown slug so friendly links keep working.
pub async fn resolve(
    store: &dyn SessionStore,
    reference: SessionRef,
) -> Result<Session, StoreError> {
    match reference {
        SessionRef::Id(id) => store.get(id).await?.ok_or(StoreError::NotFound),
        SessionRef::Slug(slug) => {
            if let Some(found) = store.find_by_slug(&slug).await? {
                return Ok(found);
            }
            store
                .create(NewSession {
                    host_id: None,
                    slug: Some(slug),
                    title: "Live Session".to_string(),
                })
                .await
        }
    }
}
