use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use uuid::Uuid;
use voclaria_live::{
    AttendanceLedger, MemoryBackend, MemoryBackendConfig, NewSession, PresenceConfig,
    PresenceTracker, ReactionAggregator, ReactionKind, SessionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("🎬 Starting live session walkthrough (in-memory backend)");

    // 1. One hub backing every seam
    let backend = MemoryBackend::new(MemoryBackendConfig {
        heartbeat_interval: Duration::from_millis(200),
        presence_expiry: Duration::from_millis(800),
        reaper_tick: Duration::from_millis(100),
    });
    let sessions: Arc<dyn voclaria_live::SessionStore> = Arc::new(backend.clone());
    let reactions: Arc<dyn voclaria_live::ReactionStore> = Arc::new(backend.clone());
    let transport: Arc<dyn voclaria_live::RealtimeTransport> = Arc::new(backend.clone());
    let attendance: Arc<dyn voclaria_live::AttendanceStore> = Arc::new(backend.clone());

    // 2. Host goes live
    let host = Uuid::new_v4();
    let session = sessions
        .create(NewSession {
            host_id: Some(host),
            slug: Some("demo-session".to_string()),
            title: "Impromptu practice round".to_string(),
        })
        .await?;
    info!("✅ Session created: {} ({})", session.title, session.id);

    // 3. Two viewers join presence
    let tracker = PresenceTracker::new(
        Arc::clone(&transport),
        Arc::clone(&sessions),
        PresenceConfig::default(),
    );
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let alice_presence = tracker.join(session.id, alice).await?;
    let bob_presence = tracker.join(session.id, bob).await?;
    sleep(Duration::from_millis(300)).await;
    info!("👀 Viewers present: {}", alice_presence.count());

    // 4. Attendance visits bracket the stay
    let ledger = AttendanceLedger::new(Arc::clone(&attendance));
    let alice_visit = ledger.begin_visit(session.id, alice).await;
    let bob_visit = ledger.begin_visit(session.id, bob).await;

    // 5. Reactions: optimistic set, toggle off, re-set
    let alice_reactions = ReactionAggregator::subscribe(
        Arc::clone(&reactions),
        Arc::clone(&transport),
        session.id,
        alice,
    )
    .await?;
    alice_reactions.tap(ReactionKind::Heart).await;
    info!("❤️  Alice reacted: {:?}", alice_reactions.counts());
    alice_reactions.tap(ReactionKind::Heart).await; // toggles off
    alice_reactions.tap(ReactionKind::Wow).await;
    sleep(Duration::from_millis(100)).await;
    info!("😮 Counts after toggle + switch: {:?}", alice_reactions.counts());

    // 6. Bob leaves abruptly (drop, no leave) — membership lapses
    drop(bob_presence);
    sleep(Duration::from_millis(1200)).await;
    info!("📉 Viewers after Bob's heartbeats lapsed: {}", alice_presence.count());

    // 7. Orderly teardown for Alice
    alice_reactions.unsubscribe();
    alice_presence.leave().await;
    alice_visit.close().await;
    bob_visit.close().await;

    // 8. End-of-session summary
    let participants = ledger.count_participants(session.id).await;
    sessions
        .end(
            session.id,
            voclaria_live::SessionEnd {
                session_link: None,
                duration_secs: Some(42),
                participants,
            },
        )
        .await?;
    let ended = sessions.get(session.id).await?;
    info!("🏁 Session ended: {:?}", ended.map(|s| (s.status, s.participants)));

    Ok(())
}
