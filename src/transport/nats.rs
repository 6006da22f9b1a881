use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

use super::messages::{ChangeOp, PresenceBeat, ReactionChangeMessage, ReactionRowMessage};
use super::{MembershipSnapshot, PresenceSubscription, ReactionEvent, RealtimeTransport};
use crate::error::ChannelError;
use crate::reactions::ReactionRow;
use crate::session::{SessionId, UserId};

/// NATS-backed transport configuration.
#[derive(Debug, Clone)]
pub struct NatsTransportConfig {
    pub url: String,

    /// How often a member announces liveness.
    pub heartbeat_interval: Duration,

    /// How long a member survives without a beat before it lapses.
    pub presence_expiry: Duration,
}

impl Default for NatsTransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            heartbeat_interval: Duration::from_secs(5),
            presence_expiry: Duration::from_secs(15),
        }
    }
}

/// Realtime transport over NATS subjects.
///
/// Presence is heartbeat membership on `presence.session-{id}`: every client
/// publishes beats and folds everyone's beats (including its own) into a
/// local membership map with expiry. Row changes arrive as JSON on
/// `rowchange.reactions.session-{id}`, published by the storage tier.
pub struct NatsTransport {
    client: async_nats::Client,
    config: NatsTransportConfig,
}

impl NatsTransport {
    /// Connect to the NATS server.
    pub async fn connect(config: NatsTransportConfig) -> Result<Self, ChannelError> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        info!("Connected to NATS successfully");

        Ok(Self { client, config })
    }

    fn presence_subject(session_id: SessionId) -> String {
        format!("presence.session-{session_id}")
    }

    fn reaction_subject(session_id: SessionId) -> String {
        format!("rowchange.reactions.session-{session_id}")
    }

    async fn publish_beat(
        client: &async_nats::Client,
        subject: &str,
        session_id: SessionId,
        user_id: UserId,
        leaving: bool,
    ) -> Result<(), ChannelError> {
        let beat = PresenceBeat {
            session_id,
            user_id,
            at: chrono::Utc::now().to_rfc3339(),
            leaving,
        };
        let payload = serde_json::to_vec(&beat)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RealtimeTransport for NatsTransport {
    async fn join_presence(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> Result<Box<dyn PresenceSubscription>, ChannelError> {
        let subject = Self::presence_subject(session_id);

        let mut sub = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        // Announce before anything else so peers see us promptly.
        Self::publish_beat(&self.client, &subject, session_id, user_id, false).await?;

        let alive = Arc::new(AtomicBool::new(true));

        // Heartbeat publisher: stops when the subscription leaves or drops.
        let beat_client = self.client.clone();
        let beat_subject = subject.clone();
        let beat_alive = Arc::clone(&alive);
        let beat_every = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut tick = interval(beat_every);
            tick.tick().await; // first tick fires immediately; we already announced
            loop {
                tick.tick().await;
                if !beat_alive.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) =
                    Self::publish_beat(&beat_client, &beat_subject, session_id, user_id, false)
                        .await
                {
                    warn!("Failed to publish presence beat: {}", e);
                }
            }
        });

        // Membership folder: beats in, synchronized snapshots out.
        let (snap_tx, snap_rx) = mpsc::channel::<MembershipSnapshot>(32);
        let expiry = self.config.presence_expiry;
        tokio::spawn(async move {
            let mut members: HashMap<UserId, Instant> = HashMap::new();
            members.insert(user_id, Instant::now());

            let snapshot_of = |members: &HashMap<UserId, Instant>| MembershipSnapshot {
                members: members.keys().copied().collect::<BTreeSet<_>>(),
                at: chrono::Utc::now(),
            };

            if snap_tx.send(snapshot_of(&members)).await.is_err() {
                return;
            }
            let mut last: BTreeSet<UserId> = members.keys().copied().collect();

            let mut reap = interval(expiry / 3);
            loop {
                let changed = tokio::select! {
                    msg = sub.next() => match msg {
                        Some(msg) => {
                            match serde_json::from_slice::<PresenceBeat>(&msg.payload) {
                                Ok(beat) if beat.session_id == session_id => {
                                    if beat.leaving {
                                        members.remove(&beat.user_id);
                                    } else {
                                        members.insert(beat.user_id, Instant::now());
                                    }
                                    true
                                }
                                Ok(_) => false,
                                Err(e) => {
                                    warn!("Failed to parse presence beat: {}", e);
                                    false
                                }
                            }
                        }
                        // Channel lost: closing snap_tx tells the tracker,
                        // which resubscribes with backoff.
                        None => break,
                    },
                    _ = reap.tick() => {
                        let before = members.len();
                        members.retain(|_, seen| seen.elapsed() < expiry);
                        members.len() != before
                    }
                };

                if changed {
                    let current: BTreeSet<UserId> = members.keys().copied().collect();
                    if current != last {
                        last = current;
                        if snap_tx.send(snapshot_of(&members)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Presence membership task stopped for session {}", session_id);
        });

        Ok(Box::new(NatsPresenceSub {
            rx: snap_rx,
            client: self.client.clone(),
            subject,
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
        let subject = Self::reaction_subject(session_id);

        let mut sub = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        info!("Subscribed to reaction changes on {}", subject);

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let change = match serde_json::from_slice::<ReactionChangeMessage>(&msg.payload) {
                    Ok(change) => change,
                    Err(e) => {
                        warn!("Failed to parse reaction change: {}", e);
                        continue;
                    }
                };

                let Some(event) = into_event(change) else {
                    warn!("Dropping malformed reaction change");
                    continue;
                };

                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Reaction event task stopped for session {}", session_id);
        });

        Ok(rx)
    }
}

fn into_event(change: ReactionChangeMessage) -> Option<ReactionEvent> {
    fn row(msg: ReactionRowMessage) -> ReactionRow {
        ReactionRow {
            session_id: msg.session_id,
            user_id: msg.user_id,
            kind: msg.kind,
        }
    }

    match change.op {
        ChangeOp::Insert => Some(ReactionEvent::Insert(row(change.new?))),
        ChangeOp::Delete => Some(ReactionEvent::Delete(row(change.old?))),
        ChangeOp::Update => Some(ReactionEvent::Update {
            old: row(change.old?),
            new: row(change.new?),
        }),
    }
}

struct NatsPresenceSub {
    rx: mpsc::Receiver<MembershipSnapshot>,
    client: async_nats::Client,
    subject: String,
    session_id: SessionId,
    user_id: UserId,
    alive: Arc<AtomicBool>,
    left: bool,
}

#[async_trait]
impl PresenceSubscription for NatsPresenceSub {
    async fn next(&mut self) -> Option<MembershipSnapshot> {
        self.rx.recv().await
    }

    async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        self.alive.store(false, Ordering::SeqCst);

        if let Err(e) = NatsTransport::publish_beat(
            &self.client,
            &self.subject,
            self.session_id,
            self.user_id,
            true,
        )
        .await
        {
            warn!("Failed to publish presence leave: {}", e);
        }
    }
}

impl Drop for NatsPresenceSub {
    fn drop(&mut self) {
        // Abrupt drop: heartbeats stop, peers expire us after the timeout.
        self.alive.store(false, Ordering::SeqCst);
    }
}
