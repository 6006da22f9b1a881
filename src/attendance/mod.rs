//! Attendance ledger
//!
//! Answers "who attended", not "who is online right now": a historical
//! join/leave interval per (session, user), independent of presence. Writes
//! are fire-and-forget — a failure is logged, never surfaced, and never
//! blocks navigation. `VisitGuard` force-closes the open record on teardown,
//! including abnormal exits, so no phantom open record survives.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::session::{SessionId, UserId};

/// One join/leave interval. At most one open record (`left_at` = None)
/// exists per (session, user) at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Row store seam for attendance. Backends must support upsert by the
/// (session, user) composite key.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Open (or re-open) the record: `joined_at` refreshed, `left_at`
    /// cleared. Idempotent; re-joining never creates a duplicate.
    async fn upsert_open(
        &self,
        session_id: SessionId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Close the record if an open one exists. Returns whether it did.
    async fn close(
        &self,
        session_id: SessionId,
        user_id: UserId,
        left_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Distinct attendees over the session's lifetime. Used for the
    /// end-of-session summary.
    async fn count_participants(&self, session_id: SessionId) -> Result<u64, StoreError>;
}

/// Fire-and-forget attendance writes over an `AttendanceStore`.
#[derive(Clone)]
pub struct AttendanceLedger {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceLedger {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Record a join (or re-join). Errors are logged and swallowed.
    pub async fn mark_joined(&self, session_id: SessionId, user_id: UserId) {
        if let Err(e) = self
            .store
            .upsert_open(session_id, user_id, Utc::now())
            .await
        {
            warn!("Attendance join write failed for {}: {}", session_id, e);
        }
    }

    /// Record a leave if an open record exists. Errors logged and swallowed.
    pub async fn mark_left(&self, session_id: SessionId, user_id: UserId) {
        match self.store.close(session_id, user_id, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => debug!("No open attendance record for {}", session_id),
            Err(e) => warn!("Attendance leave write failed for {}: {}", session_id, e),
        }
    }

    pub async fn count_participants(&self, session_id: SessionId) -> Option<u64> {
        match self.store.count_participants(session_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Participant count failed for {}: {}", session_id, e);
                None
            }
        }
    }

    /// Open a visit and get a guard that closes it exactly once — on
    /// `close()`, or from `Drop` if the component tears down abnormally.
    pub async fn begin_visit(&self, session_id: SessionId, user_id: UserId) -> VisitGuard {
        self.mark_joined(session_id, user_id).await;
        info!("Attendance visit opened for session {}", session_id);
        VisitGuard {
            ledger: self.clone(),
            session_id,
            user_id,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Brackets one visit. Supports visibility transitions: `suspend()` when
/// the user moves to a sub-view that should not count as attendance,
/// `resume()` when they come back.
pub struct VisitGuard {
    ledger: AttendanceLedger,
    session_id: SessionId,
    user_id: UserId,
    closed: Arc<AtomicBool>,
}

impl VisitGuard {
    /// Close the visit. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ledger.mark_left(self.session_id, self.user_id).await;
    }

    /// Pause attendance without ending the visit lifecycle.
    pub async fn suspend(&self) {
        self.ledger.mark_left(self.session_id, self.user_id).await;
    }

    /// Re-open attendance after a `suspend()` (or a `close()` that turned
    /// out not to be final).
    pub async fn resume(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.ledger.mark_joined(self.session_id, self.user_id).await;
    }
}

impl Drop for VisitGuard {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ledger = self.ledger.clone();
        let session_id = self.session_id;
        let user_id = self.user_id;
        // Force-close on teardown. Outside a runtime there is nothing to
        // write with; the record is closed by session-end housekeeping.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                ledger.mark_left(session_id, user_id).await;
            });
        }
    }
}
