use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::session::{SessionId, SessionStore, UserId};
use crate::transport::{MembershipSnapshot, PresenceSubscription, RealtimeTransport};

/// Tunables for one presence membership.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Quiet window before the advisory count snapshot is written through.
    pub debounce: Duration,

    /// First resubscribe delay after transport loss; doubles up to the cap.
    pub resubscribe_backoff: Duration,

    pub max_backoff: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            resubscribe_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Joins presence channels and keeps durable snapshots in sync.
pub struct PresenceTracker {
    transport: Arc<dyn RealtimeTransport>,
    sessions: Arc<dyn SessionStore>,
    config: PresenceConfig,
}

impl PresenceTracker {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        sessions: Arc<dyn SessionStore>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            transport,
            sessions,
            config,
        }
    }

    /// Join the presence channel for a session.
    ///
    /// The returned handle carries a watch channel that fires on every
    /// membership change with the current member set and cardinality, never
    /// a delta. The initial subscription must succeed; afterwards transport
    /// loss is recovered internally with backoff and the last known
    /// membership is retained until resubscribed.
    pub async fn join(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<PresenceHandle, ChannelError> {
        let subscription = self.transport.join_presence(session_id, user_id).await?;

        info!("Joined presence for session {} as {}", session_id, user_id);

        let (snap_tx, snap_rx) = watch::channel(MembershipSnapshot::empty());
        let leave = Arc::new(Notify::new());
        let left = Arc::new(AtomicBool::new(false));

        let membership_task = tokio::spawn(Self::run_membership(
            Arc::clone(&self.transport),
            subscription,
            session_id,
            user_id,
            snap_tx,
            Arc::clone(&leave),
            Arc::clone(&left),
            self.config.clone(),
        ));

        let writer_task = tokio::spawn(Self::run_snapshot_writer(
            Arc::clone(&self.sessions),
            session_id,
            snap_rx.clone(),
            self.config.debounce,
        ));

        Ok(PresenceHandle {
            session_id,
            snapshots: snap_rx,
            leave,
            left,
            membership_task: Mutex::new(Some(membership_task)),
            writer_task: Mutex::new(Some(writer_task)),
        })
    }

    /// Consume membership snapshots, resubscribing on channel loss.
    ///
    /// `departing` distinguishes an explicit `leave()` from the handle being
    /// dropped: only the former announces departure. A plain drop lets the
    /// subscription fall abruptly, so the membership lapses on the
    /// transport's heartbeat expiry instead.
    #[allow(clippy::too_many_arguments)]
    async fn run_membership(
        transport: Arc<dyn RealtimeTransport>,
        mut subscription: Box<dyn PresenceSubscription>,
        session_id: SessionId,
        user_id: UserId,
        snap_tx: watch::Sender<MembershipSnapshot>,
        leave: Arc<Notify>,
        departing: Arc<AtomicBool>,
        config: PresenceConfig,
    ) {
        let mut backoff = config.resubscribe_backoff;

        'outer: loop {
            loop {
                tokio::select! {
                    _ = leave.notified() => {
                        if departing.load(Ordering::SeqCst) {
                            subscription.leave().await;
                        }
                        break 'outer;
                    }
                    next = subscription.next() => match next {
                        Some(snapshot) => {
                            backoff = config.resubscribe_backoff;
                            snap_tx.send_replace(snapshot);
                        }
                        None => break,
                    }
                }
            }

            // Transport loss. The last known membership stays in the watch
            // channel; no artificial reset to zero while we reconnect.
            warn!(
                "Presence channel lost for session {}, resubscribing in {:?}",
                session_id, backoff
            );

            loop {
                tokio::select! {
                    _ = leave.notified() => break 'outer,
                    _ = sleep(backoff) => {}
                }

                match transport.join_presence(session_id, user_id).await {
                    Ok(sub) => {
                        info!("Presence resubscribed for session {}", session_id);
                        subscription = sub;
                        continue 'outer;
                    }
                    Err(e) => {
                        backoff = (backoff * 2).min(config.max_backoff);
                        warn!(
                            "Presence resubscribe failed ({}), retrying in {:?}",
                            e, backoff
                        );
                    }
                }
            }
        }

        debug!("Presence membership task stopped for session {}", session_id);
    }

    /// Debounced advisory write-through of the count to the session store.
    /// Collapses a burst of changes into a single write after a quiet window.
    async fn run_snapshot_writer(
        sessions: Arc<dyn SessionStore>,
        session_id: SessionId,
        mut snapshots: watch::Receiver<MembershipSnapshot>,
        debounce: Duration,
    ) {
        loop {
            if snapshots.changed().await.is_err() {
                break;
            }

            // Quiet window: restart while changes keep arriving.
            loop {
                tokio::select! {
                    _ = sleep(debounce) => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            let count = snapshots.borrow().count() as u32;
            if let Err(e) = sessions.update_viewer_snapshot(session_id, count).await {
                // Advisory only; never escalated.
                warn!("Viewer snapshot write failed for {}: {}", session_id, e);
            }
        }
    }
}

/// An open presence membership. Watch `snapshots()` for live counts; call
/// `leave()` when departing. Dropping the handle without leaving is safe:
/// heartbeats stop and the membership lapses on the transport's timeout.
pub struct PresenceHandle {
    session_id: SessionId,
    snapshots: watch::Receiver<MembershipSnapshot>,
    leave: Arc<Notify>,
    left: Arc<AtomicBool>,
    membership_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Fires with the current member set on every membership change.
    pub fn snapshots(&self) -> watch::Receiver<MembershipSnapshot> {
        self.snapshots.clone()
    }

    /// The viewer count right now: always `|members|`, never a running sum.
    pub fn count(&self) -> usize {
        self.snapshots.borrow().count()
    }

    /// Depart gracefully. Idempotent; later calls are no-ops.
    pub async fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        self.leave.notify_one();

        if let Some(task) = self.membership_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Presence membership task panicked: {}", e);
            }
        }
        if let Some(task) = self.writer_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Presence writer task panicked: {}", e);
            }
        }

        info!("Left presence for session {}", self.session_id);
    }
}

impl Drop for PresenceHandle {
    fn drop(&mut self) {
        // Abrupt teardown: wake the membership task so it can wind down.
        // Correctness does not depend on this; the heartbeat expiry does
        // the real work on the transport side.
        self.leave.notify_one();
    }
}
