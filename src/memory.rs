//! Integrated in-memory backend
//!
//! One hub implementing every collaborator seam — session rows, reaction
//! rows, attendance rows, object storage, and the realtime transport — with
//! the coupling a real backend has: durable reaction writes fan out as
//! change events, and presence members lapse when their heartbeats stop.
//! Serves as the test double and the offline/local mode.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::attendance::{AttendanceRecord, AttendanceStore};
use crate::error::{ChannelError, ObjectStoreError, StoreError};
use crate::reactions::{ReactionCounts, ReactionKind, ReactionRow, ReactionStore};
use crate::session::{
    NewSession, Session, SessionEnd, SessionId, SessionStatus, SessionStore, UserId,
};
use crate::transport::{
    MembershipSnapshot, PresenceSubscription, ReactionEvent, RealtimeTransport,
};
use crate::upload::ObjectStore;

/// Timing knobs for the in-memory presence hub. Tests shrink these to keep
/// heartbeat-expiry scenarios fast.
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    pub heartbeat_interval: Duration,
    pub presence_expiry: Duration,
    pub reaper_tick: Duration,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            presence_expiry: Duration::from_secs(3),
            reaper_tick: Duration::from_millis(200),
        }
    }
}

/// One stored object, inspectable in tests.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

struct Room {
    members: HashMap<UserId, Instant>,
    bus: broadcast::Sender<MembershipSnapshot>,
}

struct Inner {
    config: MemoryBackendConfig,
    sessions: Mutex<HashMap<SessionId, Session>>,
    reactions: Mutex<HashMap<(SessionId, UserId), ReactionKind>>,
    reaction_buses: Mutex<HashMap<SessionId, broadcast::Sender<ReactionEvent>>>,
    attendance: Mutex<HashMap<(SessionId, UserId), AttendanceRecord>>,
    rooms: Mutex<HashMap<SessionId, Room>>,
    objects: Mutex<HashMap<String, StoredObject>>,
    rejected_types: Mutex<HashSet<String>>,
    reaction_failures: AtomicU32,
    reaper_started: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Construct the hub. Runtime-free; the presence reaper task starts
    /// with the first `join_presence`.
    pub fn new(config: MemoryBackendConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: Mutex::new(HashMap::new()),
                reactions: Mutex::new(HashMap::new()),
                reaction_buses: Mutex::new(HashMap::new()),
                attendance: Mutex::new(HashMap::new()),
                rooms: Mutex::new(HashMap::new()),
                objects: Mutex::new(HashMap::new()),
                rejected_types: Mutex::new(HashSet::new()),
                reaction_failures: AtomicU32::new(0),
                reaper_started: AtomicBool::new(false),
            }),
        }
    }

    /// Make the object store reject this content type, to exercise the
    /// upload pipeline's MIME fallback.
    pub fn reject_content_type(&self, content_type: &str) {
        lock(&self.inner.rejected_types).insert(content_type.to_string());
    }

    /// Fail the next `n` durable reaction writes, to exercise rollback.
    pub fn fail_reaction_writes(&self, n: u32) {
        self.inner.reaction_failures.store(n, Ordering::SeqCst);
    }

    /// Tear down the presence channel for a session, as a transport outage
    /// would. Every live subscription sees its stream end and has to
    /// resubscribe; membership rebuilds from heartbeats after rejoin.
    pub fn sever_presence(&self, session_id: SessionId) {
        if lock(&self.inner.rooms).remove(&session_id).is_some() {
            debug!("Severed presence channel for session {}", session_id);
        }
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        lock(&self.inner.objects).get(path).cloned()
    }

    pub fn attendance_record(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Option<AttendanceRecord> {
        lock(&self.inner.attendance)
            .get(&(session_id, user_id))
            .cloned()
    }
}

impl Inner {
    /// Reaper: lapse members whose heartbeats stopped. Holds only a weak
    /// reference so dropping the backend winds the task down.
    fn ensure_reaper(self: &Arc<Self>) {
        if self.reaper_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let tick = self.config.reaper_tick;
        let weak: Weak<Inner> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Some(inner) = weak.upgrade() else { break };
                Inner::reap(&inner);
            }
            debug!("Memory presence reaper stopped");
        });
    }

    fn reap(self: &Arc<Self>) {
        let expiry = self.config.presence_expiry;
        let mut rooms = lock(&self.rooms);
        for room in rooms.values_mut() {
            let before = room.members.len();
            room.members.retain(|_, seen| seen.elapsed() < expiry);
            if room.members.len() != before {
                Self::broadcast_room(room);
            }
        }
    }

    fn broadcast_room(room: &Room) {
        let snapshot = MembershipSnapshot {
            members: room.members.keys().copied().collect::<BTreeSet<_>>(),
            at: Utc::now(),
        };
        let _ = room.bus.send(snapshot);
    }

    fn publish_reaction(&self, session_id: SessionId, event: ReactionEvent) {
        if let Some(bus) = lock(&self.reaction_buses).get(&session_id) {
            let _ = bus.send(event);
        }
    }

    fn take_reaction_failure(&self) -> bool {
        self.reaction_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn create(&self, new: NewSession) -> Result<Session, StoreError> {
        let mut sessions = lock(&self.inner.sessions);
        if let Some(slug) = &new.slug {
            if sessions.values().any(|s| s.slug.as_deref() == Some(slug)) {
                return Err(StoreError::Conflict);
            }
        }

        let session = Session {
            id: Uuid::new_v4(),
            host_id: new.host_id,
            slug: new.slug,
            title: new.title,
            status: SessionStatus::Live,
            viewer_snapshot: 0,
            session_link: None,
            duration_secs: None,
            participants: None,
            created_at: Utc::now(),
        };
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        Ok(lock(&self.inner.sessions).get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Session>, StoreError> {
        Ok(lock(&self.inner.sessions)
            .values()
            .find(|s| s.slug.as_deref() == Some(slug))
            .cloned())
    }

    async fn list_live(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut live: Vec<Session> = lock(&self.inner.sessions)
            .values()
            .filter(|s| s.status == SessionStatus::Live)
            .cloned()
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        live.truncate(limit);
        Ok(live)
    }

    async fn update_viewer_snapshot(&self, id: SessionId, count: u32) -> Result<(), StoreError> {
        let mut sessions = lock(&self.inner.sessions);
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.viewer_snapshot = count;
        Ok(())
    }

    async fn end(&self, id: SessionId, summary: SessionEnd) -> Result<(), StoreError> {
        let mut sessions = lock(&self.inner.sessions);
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.status = SessionStatus::Ended;
        if summary.session_link.is_some() {
            session.session_link = summary.session_link;
        }
        if summary.duration_secs.is_some() {
            session.duration_secs = summary.duration_secs;
        }
        if summary.participants.is_some() {
            session.participants = summary.participants;
        }
        Ok(())
    }
}

#[async_trait]
impl ReactionStore for MemoryBackend {
    async fn upsert(&self, row: ReactionRow) -> Result<(), StoreError> {
        if self.inner.take_reaction_failure() {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }

        let event = {
            let mut reactions = lock(&self.inner.reactions);
            let old = reactions.insert((row.session_id, row.user_id), row.kind);
            match old {
                None => Some(ReactionEvent::Insert(row.clone())),
                Some(old_kind) if old_kind != row.kind => Some(ReactionEvent::Update {
                    old: ReactionRow {
                        kind: old_kind,
                        ..row.clone()
                    },
                    new: row.clone(),
                }),
                Some(_) => None,
            }
        };

        if let Some(event) = event {
            self.inner.publish_reaction(row.session_id, event);
        }
        Ok(())
    }

    async fn delete(&self, session_id: SessionId, user_id: UserId) -> Result<(), StoreError> {
        if self.inner.take_reaction_failure() {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }

        let removed = lock(&self.inner.reactions).remove(&(session_id, user_id));
        if let Some(kind) = removed {
            self.inner.publish_reaction(
                session_id,
                ReactionEvent::Delete(ReactionRow {
                    session_id,
                    user_id,
                    kind,
                }),
            );
        }
        Ok(())
    }

    async fn counts(&self, session_id: SessionId) -> Result<ReactionCounts, StoreError> {
        let reactions = lock(&self.inner.reactions);
        let mut counts = ReactionCounts::default();
        for ((sid, _), kind) in reactions.iter() {
            if *sid != session_id {
                continue;
            }
            match kind {
                ReactionKind::Heart => counts.heart += 1,
                ReactionKind::Wow => counts.wow += 1,
                ReactionKind::Like => counts.like += 1,
            }
        }
        Ok(counts)
    }

    async fn reaction_of(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Option<ReactionKind>, StoreError> {
        Ok(lock(&self.inner.reactions)
            .get(&(session_id, user_id))
            .copied())
    }
}

#[async_trait]
impl AttendanceStore for MemoryBackend {
    async fn upsert_open(
        &self,
        session_id: SessionId,
        user_id: UserId,
        joined_at: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError> {
        lock(&self.inner.attendance).insert(
            (session_id, user_id),
            AttendanceRecord {
                session_id,
                user_id,
                joined_at,
                left_at: None,
            },
        );
        Ok(())
    }

    async fn close(
        &self,
        session_id: SessionId,
        user_id: UserId,
        left_at: chrono::DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut attendance = lock(&self.inner.attendance);
        match attendance.get_mut(&(session_id, user_id)) {
            Some(record) if record.left_at.is_none() => {
                record.left_at = Some(left_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_participants(&self, session_id: SessionId) -> Result<u64, StoreError> {
        Ok(lock(&self.inner.attendance)
            .keys()
            .filter(|(sid, _)| *sid == session_id)
            .count() as u64)
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        if lock(&self.inner.rejected_types).contains(content_type) {
            return Err(ObjectStoreError::UnsupportedContentType(
                content_type.to_string(),
            ));
        }

        let mut objects = lock(&self.inner.objects);
        if objects.contains_key(path) {
            return Err(ObjectStoreError::DuplicatePath);
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        if !lock(&self.inner.objects).contains_key(path) {
            return Err(ObjectStoreError::NotFound);
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("memory://{path}?expires={expires}"))
    }
}

#[async_trait]
impl RealtimeTransport for MemoryBackend {
    async fn join_presence(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Box<dyn PresenceSubscription>, ChannelError> {
        self.inner.ensure_reaper();

        let rx = {
            let mut rooms = lock(&self.inner.rooms);
            let room = rooms.entry(session_id).or_insert_with(|| Room {
                members: HashMap::new(),
                bus: broadcast::channel(64).0,
            });
            let rx = room.bus.subscribe();
            room.members.insert(user_id, Instant::now());
            Inner::broadcast_room(room);
            rx
        };

        // Heartbeat refresher: stops on leave or when the subscription is
        // dropped abruptly, after which the reaper lapses the membership.
        let alive = Arc::new(AtomicBool::new(true));
        let beat_alive = Arc::clone(&alive);
        let beat_inner = Arc::downgrade(&self.inner);
        let beat_every = self.inner.config.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(beat_every).await;
                if !beat_alive.load(Ordering::SeqCst) {
                    break;
                }
                let Some(inner) = beat_inner.upgrade() else { break };
                let mut rooms = lock(&inner.rooms);
                if let Some(room) = rooms.get_mut(&session_id) {
                    let rejoined = room.members.insert(user_id, Instant::now()).is_none();
                    if rejoined {
                        Inner::broadcast_room(room);
                    }
                }
            }
        });

        Ok(Box::new(MemoryPresenceSub {
            rx,
            inner: Arc::clone(&self.inner),
            session_id,
            user_id,
            alive,
            left: false,
        }))
    }

    async fn reaction_events(
        &self,
        session_id: SessionId,
    ) -> Result<mpsc::Receiver<ReactionEvent>, ChannelError> {
        let mut bus_rx = {
            let mut buses = lock(&self.inner.reaction_buses);
            buses
                .entry(session_id)
                .or_insert_with(|| broadcast::channel(64).0)
                .subscribe()
        };

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Reaction event forwarder lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

struct MemoryPresenceSub {
    rx: broadcast::Receiver<MembershipSnapshot>,
    inner: Arc<Inner>,
    session_id: SessionId,
    user_id: UserId,
    alive: Arc<AtomicBool>,
    left: bool,
}

#[async_trait]
impl PresenceSubscription for MemoryPresenceSub {
    async fn next(&mut self) -> Option<MembershipSnapshot> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                // Snapshots are absolute; skipping stale ones is safe.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        self.alive.store(false, Ordering::SeqCst);

        let mut rooms = lock(&self.inner.rooms);
        if let Some(room) = rooms.get_mut(&self.session_id) {
            if room.members.remove(&self.user_id).is_some() {
                Inner::broadcast_room(room);
            }
        }
    }
}

impl Drop for MemoryPresenceSub {
    fn drop(&mut self) {
        // Abrupt drop: heartbeats stop, the reaper lapses the membership
        // after the expiry window. No immediate removal, by contract.
        self.alive.store(false, Ordering::SeqCst);
    }
}
