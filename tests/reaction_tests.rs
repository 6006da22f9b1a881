// Integration tests for the reaction aggregator
//
// These tests verify the optimistic counter algebra: one reaction state per
// (session, user), toggle-to-clear, exact-inverse rollback on a failed
// durable write, and reconciliation of remote change events without
// double-counting the caller's own writes.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;
use voclaria_live::{
    MemoryBackend, MemoryBackendConfig, NewSession, ReactionAggregator, ReactionKind, ReactionRow,
    ReactionStore, SessionId, SessionStore,
};

async fn setup() -> Result<(MemoryBackend, SessionId)> {
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    let session = backend
        .create(NewSession {
            host_id: None,
            slug: None,
            title: "reaction test".to_string(),
        })
        .await?;
    Ok((backend, session.id))
}

async fn aggregator(backend: &MemoryBackend, session_id: SessionId) -> Result<ReactionAggregator> {
    Ok(ReactionAggregator::subscribe(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        session_id,
        Uuid::new_v4(),
    )
    .await?)
}

#[tokio::test]
async fn initial_counts_loaded_on_subscribe() -> Result<()> {
    let (backend, session_id) = setup().await?;

    for kind in [ReactionKind::Heart, ReactionKind::Heart, ReactionKind::Wow] {
        backend
            .upsert(ReactionRow {
                session_id,
                user_id: Uuid::new_v4(),
                kind,
            })
            .await?;
    }

    let agg = aggregator(&backend, session_id).await?;
    let counts = agg.counts();
    assert_eq!(counts.heart, 2);
    assert_eq!(counts.wow, 1);
    assert_eq!(counts.like, 0);
    assert_eq!(agg.my_reaction(), None);
    Ok(())
}

#[tokio::test]
async fn tap_sets_toggles_and_switches() -> Result<()> {
    let (backend, session_id) = setup().await?;
    let agg = aggregator(&backend, session_id).await?;

    agg.tap(ReactionKind::Heart).await;
    assert_eq!(agg.counts().heart, 1);
    assert_eq!(agg.my_reaction(), Some(ReactionKind::Heart));

    // Same kind again clears it.
    agg.tap(ReactionKind::Heart).await;
    assert_eq!(agg.counts().heart, 0);
    assert_eq!(agg.my_reaction(), None);

    // Switching moves the count, never accumulates.
    agg.tap(ReactionKind::Wow).await;
    agg.tap(ReactionKind::Like).await;
    let counts = agg.counts();
    assert_eq!(counts.wow, 0);
    assert_eq!(counts.like, 1);
    assert_eq!(agg.my_reaction(), Some(ReactionKind::Like));
    Ok(())
}

#[tokio::test]
async fn one_durable_row_per_user() -> Result<()> {
    let (backend, session_id) = setup().await?;
    let agg = aggregator(&backend, session_id).await?;

    agg.tap(ReactionKind::Heart).await;
    agg.tap(ReactionKind::Wow).await;
    agg.tap(ReactionKind::Like).await;

    let counts = backend.counts(session_id).await?;
    assert_eq!(counts.heart + counts.wow + counts.like, 1, "rapid switching never duplicates rows");
    Ok(())
}

#[tokio::test]
async fn remote_events_reconcile_counts() -> Result<()> {
    let (backend, session_id) = setup().await?;
    let agg = aggregator(&backend, session_id).await?;

    let other = Uuid::new_v4();
    backend
        .upsert(ReactionRow {
            session_id,
            user_id: other,
            kind: ReactionKind::Heart,
        })
        .await?;

    let mut counts_rx = agg.watch_counts();
    timeout(Duration::from_secs(1), counts_rx.changed()).await??;
    assert_eq!(agg.counts().heart, 1);

    // Update moves the count between kinds.
    backend
        .upsert(ReactionRow {
            session_id,
            user_id: other,
            kind: ReactionKind::Wow,
        })
        .await?;
    timeout(Duration::from_secs(1), counts_rx.changed()).await??;
    assert_eq!(agg.counts().heart, 0);
    assert_eq!(agg.counts().wow, 1);

    backend.delete(session_id, other).await?;
    timeout(Duration::from_secs(1), counts_rx.changed()).await??;
    assert_eq!(agg.counts().wow, 0);
    Ok(())
}

#[tokio::test]
async fn own_writes_not_double_counted() -> Result<()> {
    let (backend, session_id) = setup().await?;
    let agg = aggregator(&backend, session_id).await?;

    agg.tap(ReactionKind::Heart).await;

    // The durable write fans back out as a change event attributed to us;
    // the optimistic count must not absorb it a second time.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(agg.counts().heart, 1);
    Ok(())
}

#[tokio::test]
async fn failed_write_rolls_back_exact_inverse() -> Result<()> {
    let (backend, session_id) = setup().await?;

    let other = Uuid::new_v4();
    backend
        .upsert(ReactionRow {
            session_id,
            user_id: other,
            kind: ReactionKind::Heart,
        })
        .await?;

    let me = Uuid::new_v4();
    let agg = ReactionAggregator::subscribe(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        session_id,
        me,
    )
    .await?;
    assert_eq!(agg.counts().heart, 1);

    backend.fail_reaction_writes(1);
    agg.tap(ReactionKind::Heart).await;

    // Rollback restores the pre-tap state, not zero.
    assert_eq!(agg.counts().heart, 1);
    assert_eq!(agg.my_reaction(), None);
    assert_eq!(backend.reaction_of(session_id, me).await?, None);
    Ok(())
}

#[tokio::test]
async fn concurrent_taps_settle_on_last_intent() -> Result<()> {
    let (backend, session_id) = setup().await?;
    let agg = Arc::new(aggregator(&backend, session_id).await?);

    let a = Arc::clone(&agg);
    let b = Arc::clone(&agg);
    tokio::join!(a.tap(ReactionKind::Heart), b.tap(ReactionKind::Wow));
    sleep(Duration::from_millis(100)).await;

    // Whatever order the taps landed in, durable state matches local state.
    let counts = backend.counts(session_id).await?;
    let local = agg.my_reaction();
    match local {
        Some(kind) => {
            assert_eq!(counts.get(kind), 1);
            assert_eq!(agg.counts().get(kind), 1);
        }
        None => assert_eq!(counts.heart + counts.wow + counts.like, 0),
    }
    Ok(())
}
