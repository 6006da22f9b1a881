use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::{ReactionRow, ReactionStore};
use super::ReactionKind;
use crate::error::StoreError;
use crate::session::{SessionId, UserId};
use crate::transport::{ReactionEvent, RealtimeTransport};

/// Live per-kind counters for one session. Counters saturate at zero; a
/// remote delete can race ahead of the insert that preceded it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionCounts {
    pub heart: u32,
    pub wow: u32,
    pub like: u32,
}

impl ReactionCounts {
    pub fn get(&self, kind: ReactionKind) -> u32 {
        match kind {
            ReactionKind::Heart => self.heart,
            ReactionKind::Wow => self.wow,
            ReactionKind::Like => self.like,
        }
    }

    fn bump(&mut self, kind: ReactionKind, up: bool) {
        let slot = match kind {
            ReactionKind::Heart => &mut self.heart,
            ReactionKind::Wow => &mut self.wow,
            ReactionKind::Like => &mut self.like,
        };
        *slot = if up { *slot + 1 } else { slot.saturating_sub(1) };
    }

    /// The shared delta algebra: decrement the previous kind, increment the
    /// next one. Serves the optimistic path and remote reconciliation alike.
    fn apply(&mut self, from: Option<ReactionKind>, to: Option<ReactionKind>) {
        if let Some(kind) = from {
            self.bump(kind, false);
        }
        if let Some(kind) = to {
            self.bump(kind, true);
        }
    }
}

fn lock(state: &Mutex<AggregatorState>) -> MutexGuard<'_, AggregatorState> {
    // Poisoning cannot corrupt the counters; recover the guard.
    state.lock().unwrap_or_else(|e| e.into_inner())
}

struct AggregatorState {
    counts: ReactionCounts,
    mine: Option<ReactionKind>,
    /// Bumped on every local intent; a durable write whose generation is no
    /// longer current has been superseded and is skipped (last intent wins).
    intent: u64,
}

/// Aggregates reactions for one (session, user) with optimistic local
/// updates, exact-inverse rollback, and remote event reconciliation.
pub struct ReactionAggregator {
    store: Arc<dyn ReactionStore>,
    session_id: SessionId,
    user_id: UserId,
    state: Arc<Mutex<AggregatorState>>,
    counts_tx: Arc<watch::Sender<ReactionCounts>>,
    counts_rx: watch::Receiver<ReactionCounts>,
    write_gate: AsyncMutex<()>,
    events_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReactionAggregator {
    /// Load initial counts and the caller's own reaction, then follow the
    /// change stream. This is the only full recount the aggregator performs.
    pub async fn subscribe(
        store: Arc<dyn ReactionStore>,
        transport: Arc<dyn RealtimeTransport>,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Self, StoreError> {
        let counts = store.counts(session_id).await?;
        let mine = store.reaction_of(session_id, user_id).await?;

        let events = transport
            .reaction_events(session_id)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        info!(
            "Reaction aggregator subscribed: session={} heart={} wow={} like={}",
            session_id, counts.heart, counts.wow, counts.like
        );

        let state = Arc::new(Mutex::new(AggregatorState {
            counts,
            mine,
            intent: 0,
        }));
        let (counts_tx, counts_rx) = watch::channel(counts);
        let counts_tx = Arc::new(counts_tx);

        let task = tokio::spawn(Self::follow_events(
            events,
            user_id,
            Arc::clone(&state),
            Arc::clone(&counts_tx),
        ));

        Ok(Self {
            store,
            session_id,
            user_id,
            state,
            counts_tx,
            counts_rx,
            write_gate: AsyncMutex::new(()),
            events_task: Mutex::new(Some(task)),
        })
    }

    async fn follow_events(
        mut events: mpsc::Receiver<ReactionEvent>,
        user_id: UserId,
        state: Arc<Mutex<AggregatorState>>,
        counts_tx: Arc<watch::Sender<ReactionCounts>>,
    ) {
        while let Some(event) = events.recv().await {
            // Our own writes already landed through the optimistic path.
            if event.user_id() == user_id {
                continue;
            }

            let counts = {
                let mut guard = lock(&state);
                match event {
                    ReactionEvent::Insert(row) => guard.counts.apply(None, Some(row.kind)),
                    ReactionEvent::Delete(row) => guard.counts.apply(Some(row.kind), None),
                    ReactionEvent::Update { old, new } => {
                        guard.counts.apply(Some(old.kind), Some(new.kind))
                    }
                }
                guard.counts
            };
            counts_tx.send_replace(counts);
        }
        debug!("Reaction event stream ended");
    }

    /// Set, switch, or clear the caller's reaction.
    ///
    /// Selecting the currently-active kind clears it (toggle semantics).
    /// The counter delta is applied optimistically before the durable write;
    /// on failure the exact inverse is rolled back. Failures are recovered
    /// locally and never surfaced. Rapid toggles serialize against the
    /// in-flight write and only the latest intent reaches the store.
    pub async fn set_reaction(&self, requested: Option<ReactionKind>) {
        let (prev, next, generation) = {
            let mut state = lock(&self.state);
            let prev = state.mine;
            let next = if requested == prev { None } else { requested };
            if next == prev {
                return;
            }
            state.counts.apply(prev, next);
            state.mine = next;
            state.intent += 1;
            self.counts_tx.send_replace(state.counts);
            (prev, next, state.intent)
        };

        let _gate = self.write_gate.lock().await;

        // A newer intent arrived while we waited; it owns durability now.
        if lock(&self.state).intent != generation {
            return;
        }

        let result = match next {
            Some(kind) => {
                self.store
                    .upsert(ReactionRow {
                        session_id: self.session_id,
                        user_id: self.user_id,
                        kind,
                    })
                    .await
            }
            None => self.store.delete(self.session_id, self.user_id).await,
        };

        if let Err(e) = result {
            warn!("Reaction write failed, rolling back: {}", e);
            let mut state = lock(&self.state);
            if state.intent == generation {
                state.counts.apply(next, prev);
                state.mine = prev;
                state.intent += 1;
                self.counts_tx.send_replace(state.counts);
            }
        }
    }

    /// Convenience for a UI tap: toggles the kind against the current state.
    pub async fn tap(&self, kind: ReactionKind) {
        self.set_reaction(Some(kind)).await;
    }

    pub fn counts(&self) -> ReactionCounts {
        *self.counts_rx.borrow()
    }

    /// Watch channel carrying every counter change.
    pub fn watch_counts(&self) -> watch::Receiver<ReactionCounts> {
        self.counts_rx.clone()
    }

    pub fn my_reaction(&self) -> Option<ReactionKind> {
        lock(&self.state).mine
    }

    /// Stop following the remote change stream. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(task) = self
            .events_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for ReactionAggregator {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
