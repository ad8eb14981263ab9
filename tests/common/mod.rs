// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use runhub::config::Config;
use runhub::db::RunDb;
use runhub::error::AppError;
use runhub::models::{PathPoint, Run};
use runhub::routes::create_router;
use runhub::services::{ChangeHub, RankingService, RemoteRunApi, RoomCoordinator};
use runhub::AppState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Create shared app state with an empty store.
#[allow(dead_code)]
pub fn create_test_state() -> Arc<AppState> {
    let config = Config::test_default();
    let db = RunDb::new();
    let hub = ChangeHub::new();
    let rooms = RoomCoordinator::new(config.room_capacity, config.room_countdown_ms, hub.clone());
    let ranking = RankingService::new(db.clone(), hub.clone());

    Arc::new(AppState {
        config,
        db,
        rooms,
        ranking,
        hub,
    })
}

/// Create a test app. Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let state = create_test_state();
    (create_router(state.clone()), state)
}

/// Create a session JWT signed with the test key.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: u64) -> String {
    let config = Config::test_default();
    runhub::middleware::auth::create_jwt(user_id, &config.jwt_signing_key)
        .expect("Failed to create test JWT")
}

/// A well-formed sample for tests.
#[allow(dead_code)]
pub fn test_point(time: i64, distance: f64) -> PathPoint {
    PathPoint {
        lat: 37.4,
        lon: -122.1,
        alt: 30.0,
        time,
        end: false,
        speed: 3.0,
        distance,
        kcal: distance * 0.06,
    }
}

/// In-memory run service with failure injection.
///
/// Backed by a real `RunDb`, so dedup and cursor semantics match the
/// server. `set_failures(n)` makes the next `n` calls fail with
/// `Disconnected` before touching the store.
pub struct FlakyRemote {
    db: RunDb,
    failures: AtomicUsize,
    calls: AtomicUsize,
    push_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyRemote {
    pub fn new() -> Self {
        Self::with_db(RunDb::new())
    }

    pub fn with_db(db: RunDb) -> Self {
        Self {
            db,
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            push_calls: AtomicUsize::new(0),
        }
    }

    pub fn db(&self) -> &RunDb {
        &self.db
    }

    /// Fail the next `n` calls with `Disconnected`.
    pub fn set_failures(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let took_failure = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| f.checked_sub(1))
            .is_ok();
        if took_failure {
            Err(AppError::Disconnected("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteRunApi for FlakyRemote {
    async fn create_run(&self, run: &Run) -> Result<(), AppError> {
        self.gate()?;
        self.db.create_run(run).await.map(|_| ())
    }

    async fn update_run(&self, run: &Run) -> Result<(), AppError> {
        self.gate()?;
        self.db.update_run(run).await
    }

    async fn push_points(
        &self,
        user_id: u64,
        run_id: u64,
        batch: &[PathPoint],
    ) -> Result<(), AppError> {
        self.gate()?;
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.db.append_points(user_id, run_id, batch).await.map(|_| ())
    }

    async fn pull_points(
        &self,
        user_id: u64,
        run_id: u64,
        since: Option<i64>,
    ) -> Result<Vec<PathPoint>, AppError> {
        self.gate()?;
        self.db.points_since(user_id, run_id, since).await
    }

    async fn runs(&self, user_id: u64) -> Result<Vec<Run>, AppError> {
        self.gate()?;
        self.db.runs_for_user(user_id).await
    }

    async fn runs_since(&self, user_id: u64, since: i64) -> Result<Vec<Run>, AppError> {
        self.gate()?;
        self.db.runs_since(user_id, since).await
    }

    async fn unfinished(&self, user_id: u64) -> Result<Vec<Run>, AppError> {
        self.gate()?;
        self.db.unfinished_runs(user_id).await
    }

    async fn delete_run(&self, user_id: u64, run_id: u64) -> Result<(), AppError> {
        self.gate()?;
        self.db.delete_run(user_id, run_id).await.map(|_| ())
    }
}
