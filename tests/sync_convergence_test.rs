// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync engine convergence under intermittent disconnection.
//!
//! The properties under test: repeated `ensure_synced` calls against a
//! flaky remote eventually push the full local point set with no
//! duplicates and no losses, and the sync cursor only ever moves forward.

mod common;
use common::{test_point, FlakyRemote};

use runhub::models::{Run, SyncCursor};
use runhub::services::SyncEngine;
use runhub::store::LocalStore;
use std::sync::Arc;

const USER: u64 = 42;
const RUN: u64 = 1;

/// Local store holding an unsynced run with `count` points.
fn offline_run(count: usize) -> Arc<LocalStore> {
    let local = Arc::new(LocalStore::new());
    let mut run = Run::new(RUN, USER);
    run.start = Some(1_000);
    local.upsert_run(&run);
    local
        .put_cursor(&SyncCursor::unsynced(USER, RUN))
        .unwrap();
    for i in 0..count {
        local
            .append_point(USER, RUN, test_point(1_000 + i as i64 * 1_000, i as f64 * 5.0))
            .unwrap();
    }
    local
}

#[tokio::test]
async fn test_full_sync_from_scratch() {
    let local = offline_run(10);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    let report = engine.ensure_synced(USER, RUN).await.unwrap();
    assert_eq!(report.pushed, 10);
    assert!(!report.finalized);

    let synced = remote.db().points_since(USER, RUN, None).await.unwrap();
    assert_eq!(synced.len(), 10);
    assert_eq!(
        local.get_cursor(USER, RUN).unwrap().since,
        Some(10_000),
        "cursor should sit on the newest acknowledged point"
    );
}

#[tokio::test]
async fn test_disconnect_leaves_cursor_untouched() {
    let local = offline_run(5);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    remote.set_failures(1);
    let err = engine.ensure_synced(USER, RUN).await.unwrap_err();
    assert!(err.retryable());
    assert_eq!(local.get_cursor(USER, RUN).unwrap().since, None);

    // Retry is always safe and completes the push.
    engine.ensure_synced(USER, RUN).await.unwrap();
    assert_eq!(
        remote.db().points_since(USER, RUN, None).await.unwrap().len(),
        5
    );
}

#[tokio::test]
async fn test_intermittent_failures_converge_without_duplicates() {
    let local = offline_run(0);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    let mut cursor_history = vec![local.get_cursor(USER, RUN).unwrap().since];

    for i in 0..30 {
        local
            .append_point(USER, RUN, test_point(1_000 + i * 1_000, i as f64 * 5.0))
            .unwrap();
        // Every third attempt runs into a dead network.
        if i % 3 == 0 {
            remote.set_failures(1);
        }
        match engine.ensure_synced(USER, RUN).await {
            Ok(_) => {}
            Err(e) => assert!(e.retryable(), "only Disconnected may surface: {e}"),
        }
        cursor_history.push(local.get_cursor(USER, RUN).unwrap().since);
    }

    remote.set_failures(0);
    engine.ensure_synced(USER, RUN).await.unwrap();

    // Convergence: the remote set equals the local set exactly.
    let local_points = local.points_since(USER, RUN, None);
    let remote_points = remote.db().points_since(USER, RUN, None).await.unwrap();
    assert_eq!(local_points.len(), 30);
    assert_eq!(remote_points, local_points);

    // Monotonicity: the cursor never moved backwards.
    for pair in cursor_history.windows(2) {
        match (pair[0], pair[1]) {
            (Some(a), Some(b)) => assert!(b >= a, "cursor regressed: {a} -> {b}"),
            (Some(_), None) => panic!("cursor regressed to unsynced"),
            (None, _) => {}
        }
    }
}

#[tokio::test]
async fn test_resume_pushes_only_pending_tail() {
    let local = offline_run(200);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    engine.ensure_synced(USER, RUN).await.unwrap();
    let after_first = remote.push_calls();

    // More samples arrive, then the first flush attempt dies.
    for i in 200..450 {
        local
            .append_point(USER, RUN, test_point(1_000 + i * 1_000, i as f64 * 5.0))
            .unwrap();
    }
    remote.set_failures(1);
    engine.ensure_synced(USER, RUN).await.unwrap_err();
    let stalled = local.get_cursor(USER, RUN).unwrap().since;
    assert_eq!(stalled, Some(200_000), "acknowledged prefix stays valid");

    let report = engine.ensure_synced(USER, RUN).await.unwrap();
    assert_eq!(report.pushed, 250);
    assert!(remote.push_calls() > after_first);
    assert_eq!(
        remote.db().points_since(USER, RUN, None).await.unwrap().len(),
        450
    );
}

#[tokio::test]
async fn test_remote_not_found_recreates_run() {
    let local = offline_run(10);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    engine.ensure_synced(USER, RUN).await.unwrap();

    // The server drops the run entirely.
    remote.db().delete_run(USER, RUN).await.unwrap();

    for i in 10..15 {
        local
            .append_point(USER, RUN, test_point(1_000 + i * 1_000, i as f64 * 5.0))
            .unwrap();
    }
    let report = engine.ensure_synced(USER, RUN).await.unwrap();
    assert_eq!(report.pushed, 5);

    // The run exists again and carries the pending tail; the cursor kept
    // moving forward.
    assert!(remote.db().get_run(USER, RUN).await.unwrap().is_some());
    assert_eq!(
        remote.db().points_since(USER, RUN, None).await.unwrap().len(),
        5
    );
    assert_eq!(local.get_cursor(USER, RUN).unwrap().since, Some(15_000));
}

#[tokio::test]
async fn test_finished_run_is_finalized_and_cursor_retired() {
    let local = offline_run(3);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    let mut run = local.get_run(USER, RUN).unwrap();
    run.end = Some(60_000);
    local.upsert_run(&run);

    let report = engine.ensure_synced(USER, RUN).await.unwrap();
    assert!(report.finalized);
    assert!(local.get_cursor(USER, RUN).is_none());

    let remote_run = remote.db().get_run(USER, RUN).await.unwrap().unwrap();
    assert_eq!(remote_run.end, Some(60_000));
}

#[tokio::test]
async fn test_concurrent_syncs_serialize_per_run() {
    let local = offline_run(100);
    let remote = Arc::new(FlakyRemote::new());
    let engine = SyncEngine::new(local.clone(), remote.clone());

    let mut handles = vec![];
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.ensure_synced(USER, RUN).await
        }));
    }
    for handle in handles {
        handle.await.expect("task join failed").expect("sync failed");
    }

    let remote_points = remote.db().points_since(USER, RUN, None).await.unwrap();
    assert_eq!(remote_points.len(), 100, "no loss, no duplication");
    assert_eq!(local.get_cursor(USER, RUN).unwrap().since, Some(100_000));
}
