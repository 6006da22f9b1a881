use std::sync::Arc;
use tracing::{info, warn};

use crate::attendance::{AttendanceLedger, AttendanceStore, VisitGuard};
use crate::presence::{PresenceConfig, PresenceHandle, PresenceTracker};
use crate::reactions::{ReactionAggregator, ReactionStore};
use crate::session::{SessionEnd, SessionId, SessionStore, UserId};
use crate::transport::RealtimeTransport;

/// Ties a capture to a shared live session.
///
/// While recording, the capture participates in the session like any other
/// client: attendance visit open, presence membership, reaction stream.
/// The controller engages this exactly once on entering `Recording` and
/// disengages exactly once on leaving it, whatever the exit path.
pub struct LiveSessionLink {
    sessions: Arc<dyn SessionStore>,
    reactions: Arc<dyn ReactionStore>,
    attendance: Arc<dyn AttendanceStore>,
    transport: Arc<dyn RealtimeTransport>,
    presence_config: PresenceConfig,
    session_id: SessionId,
    user_id: UserId,
}

/// Live subscriptions opened by `engage`. Channel faults during engagement
/// degrade the corresponding feature instead of failing the recording.
pub(crate) struct EngagedSession {
    pub(crate) presence: Option<PresenceHandle>,
    pub(crate) reactions: Option<ReactionAggregator>,
    pub(crate) visit: VisitGuard,
}

impl LiveSessionLink {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        reactions: Arc<dyn ReactionStore>,
        attendance: Arc<dyn AttendanceStore>,
        transport: Arc<dyn RealtimeTransport>,
        presence_config: PresenceConfig,
        session_id: SessionId,
        user_id: UserId,
    ) -> Self {
        Self {
            sessions,
            reactions,
            attendance,
            transport,
            presence_config,
            session_id,
            user_id,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub(crate) async fn engage(&self) -> EngagedSession {
        let ledger = AttendanceLedger::new(Arc::clone(&self.attendance));
        let visit = ledger.begin_visit(self.session_id, self.user_id).await;

        let tracker = PresenceTracker::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.sessions),
            self.presence_config.clone(),
        );
        let presence = match tracker.join(self.session_id, self.user_id).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Presence join failed for {}: {}", self.session_id, e);
                None
            }
        };

        let reactions = match ReactionAggregator::subscribe(
            Arc::clone(&self.reactions),
            Arc::clone(&self.transport),
            self.session_id,
            self.user_id,
        )
        .await
        {
            Ok(aggregator) => Some(aggregator),
            Err(e) => {
                warn!("Reaction subscribe failed for {}: {}", self.session_id, e);
                None
            }
        };

        info!("Capture engaged with session {}", self.session_id);

        EngagedSession {
            presence,
            reactions,
            visit,
        }
    }

    /// Reverse everything `engage` opened. Ordering matters: channels are
    /// unsubscribed before the attendance record closes, so the close
    /// reflects a still-open membership being torn down.
    pub(crate) async fn disengage(&self, engaged: EngagedSession) {
        if let Some(aggregator) = &engaged.reactions {
            aggregator.unsubscribe();
        }
        if let Some(presence) = &engaged.presence {
            presence.leave().await;
        }
        engaged.visit.close().await;

        info!("Capture disengaged from session {}", self.session_id);
    }

    /// Write the end-of-session summary: retrieval link, frozen duration,
    /// and the distinct participant count from the attendance ledger.
    pub async fn finish(&self, session_link: Option<String>, duration_secs: u64) {
        let ledger = AttendanceLedger::new(Arc::clone(&self.attendance));
        let participants = ledger.count_participants(self.session_id).await;

        if let Err(e) = self
            .sessions
            .end(
                self.session_id,
                SessionEnd {
                    session_link,
                    duration_secs: Some(duration_secs),
                    participants,
                },
            )
            .await
        {
            warn!("Session end write failed for {}: {}", self.session_id, e);
        }
    }
}
