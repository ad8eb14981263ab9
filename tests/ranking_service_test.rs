// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live ranking service: ordering, disqualification, and the long-poll
//! subscription contract.

mod common;
use common::test_point;

use runhub::db::RunDb;
use runhub::error::AppError;
use runhub::models::{Event, PathPoint, Run, Waypoint};
use runhub::services::{ChangeHub, RankScope, RankingService};
use std::collections::HashSet;
use std::time::Duration;

const EVENT: u64 = 5;

fn equator_event(tolerance_m: Option<f64>) -> Event {
    Event {
        id: EVENT,
        course: vec![
            Waypoint { lat: 0.0, lon: 0.0 },
            Waypoint { lat: 0.0, lon: 0.01 },
        ],
        distance_m: 1_113.0,
        tolerance_m,
        followers: HashSet::new(),
    }
}

fn course_point(lat: f64, lon: f64, time: i64) -> PathPoint {
    PathPoint {
        lat,
        lon,
        alt: 0.0,
        time,
        end: false,
        speed: 3.0,
        distance: 0.0,
        kcal: 0.0,
    }
}

async fn service_with_event(tolerance_m: Option<f64>) -> (RankingService, RunDb, ChangeHub) {
    let db = RunDb::new();
    let hub = ChangeHub::new();
    db.upsert_event(&equator_event(tolerance_m)).await.unwrap();
    (RankingService::new(db.clone(), hub.clone()), db, hub)
}

async fn insert_run(
    db: &RunDb,
    user: u64,
    start: Option<i64>,
    end: Option<i64>,
    progress: f64,
    path: &[PathPoint],
) {
    let mut run = Run::new(1, user);
    run.event_id = Some(EVENT);
    run.start = start;
    run.cur = Some(progress);
    db.create_run(&run).await.unwrap();
    if !path.is_empty() {
        db.append_points(user, 1, path).await.unwrap();
    }
    if let Some(end) = end {
        run.end = Some(end);
        db.update_run(&run).await.unwrap();
    }
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let db = RunDb::new();
    let service = RankingService::new(db, ChangeHub::new());
    let err = service.rank(RankScope::Event(99)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_full_ordering_across_groups() {
    let (service, db, _hub) = service_with_event(None).await;

    insert_run(&db, 1, Some(0), Some(50_000), 1_113.0, &[]).await; // slow finisher
    insert_run(&db, 2, Some(0), Some(40_000), 1_113.0, &[]).await; // fast finisher
    insert_run(&db, 3, Some(0), None, 900.0, &[]).await; // leading runner
    insert_run(&db, 4, Some(0), None, 400.0, &[]).await; // trailing runner

    let ranking = service.rank(RankScope::Event(EVENT)).await.unwrap();
    let order: Vec<u64> = ranking.entries.iter().map(|e| e.user_id).collect();
    assert_eq!(order, vec![2, 1, 3, 4]);
    assert!(ranking.entries[0].finished);
    assert!(!ranking.entries[2].finished);
}

#[tokio::test]
async fn test_tolerance_boundary() {
    let (service, db, _hub) = service_with_event(Some(50.0)).await;

    // User 1 stays within ~45 m of the course the whole way.
    let clean: Vec<PathPoint> = (0..10)
        .map(|i| course_point(0.0004, 0.001 * i as f64, 1_000 + i * 1_000))
        .collect();
    insert_run(&db, 1, Some(0), Some(60_000), 1_113.0, &clean).await;

    // User 2 matches, except one sample ~61 m off the line.
    let mut strayed = clean.clone();
    strayed.push(course_point(0.00055, 0.005, 20_000));
    insert_run(&db, 2, Some(0), Some(40_000), 1_113.0, &strayed).await;

    let ranking = service.rank(RankScope::Event(EVENT)).await.unwrap();
    // The faster run is disqualified, flagged, ranked last, still present.
    assert_eq!(ranking.entries.len(), 2);
    assert_eq!(ranking.entries[0].user_id, 1);
    assert!(!ranking.entries[0].disqualified);
    assert_eq!(ranking.entries[1].user_id, 2);
    assert!(ranking.entries[1].disqualified);

    // Appending more clean samples can never un-disqualify the run.
    db.append_points(2, 1, &[course_point(0.0, 0.009, 30_000)])
        .await
        .unwrap();
    let ranking = service.rank(RankScope::Event(EVENT)).await.unwrap();
    assert!(ranking.entries[1].disqualified);
}

#[tokio::test]
async fn test_subscribe_wakes_on_ranking_change() {
    let (service, db, _hub) = service_with_event(None).await;
    insert_run(&db, 1, Some(0), None, 100.0, &[]).await;

    let known = service.rank(RankScope::Event(EVENT)).await.unwrap().version;

    let subscriber = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .subscribe(RankScope::Event(EVENT), Some(known), Duration::from_secs(10))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A progress push arrives (the route layer signals after the write).
    db.append_points(1, 1, &[test_point(5_000, 250.0)]).await.unwrap();
    let run = db.get_run(1, 1).await.unwrap().unwrap();
    service.notify_run(&run);

    let ranking = subscriber
        .await
        .expect("subscriber panicked")
        .expect("subscribe failed");
    assert!(ranking.version > known);
    assert_eq!(ranking.entries.len(), 1);
}

#[tokio::test]
async fn test_subscribe_times_out_with_current_snapshot() {
    let (service, db, _hub) = service_with_event(None).await;
    insert_run(&db, 1, Some(0), None, 100.0, &[]).await;

    let known = service.rank(RankScope::Event(EVENT)).await.unwrap().version;
    let started = std::time::Instant::now();
    let ranking = service
        .subscribe(RankScope::Event(EVENT), Some(known), Duration::from_millis(50))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(ranking.version, known);
    assert_eq!(ranking.entries.len(), 1);
}

#[tokio::test]
async fn test_stale_subscriber_returns_immediately() {
    let (service, db, hub) = service_with_event(None).await;
    insert_run(&db, 1, Some(0), None, 100.0, &[]).await;
    hub.signal(&RankScope::Event(EVENT).topic());

    let started = std::time::Instant::now();
    let ranking = service
        .subscribe(RankScope::Event(EVENT), Some(0), Duration::from_secs(30))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(ranking.version, 1);
}

#[tokio::test]
async fn test_room_scope_ranks_without_course() {
    let db = RunDb::new();
    let service = RankingService::new(db.clone(), ChangeHub::new());

    let mut run_a = Run::new(1, 10);
    run_a.room_id = Some(3);
    run_a.start = Some(0);
    run_a.cur = Some(500.0);
    db.create_run(&run_a).await.unwrap();

    let mut run_b = Run::new(1, 11);
    run_b.room_id = Some(3);
    run_b.start = Some(0);
    run_b.cur = Some(800.0);
    db.create_run(&run_b).await.unwrap();

    let ranking = service.rank(RankScope::Room(3)).await.unwrap();
    let order: Vec<u64> = ranking.entries.iter().map(|e| e.user_id).collect();
    assert_eq!(order, vec![11, 10]);
    assert!(ranking.entries.iter().all(|e| !e.disqualified));
}
