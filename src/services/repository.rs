// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Combined run repository: one "current run" view over two tiers.
//!
//! Write policy: metadata mutations go to the server first and are mirrored
//! locally on confirmed success; point appends are the one deliberate
//! asymmetry: written locally immediately so a run never blocks on the
//! network, then reconciled by the sync engine. Reads prefer the server and
//! fall back to the local store, tagged so callers can tell a possibly-stale
//! view from server truth.
//!
//! Run finalization is a multi-step transaction with a defined
//! partially-applied state: the finished record lands locally first, then
//! points and final metadata flush to the server. If the flush dies partway
//! the local store is ahead of the server (finished run, live cursor) and
//! the next `ensure_synced` replays exactly the unacknowledged tail.

use crate::error::AppError;
use crate::models::{PathPoint, Run, SyncCursor};
use crate::store::LocalStore;
use futures_util::{stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use validator::Validate;

use super::remote::RemoteRunApi;
use super::sync::{SyncEngine, SyncReport};

/// Bounded run-replay concurrency during a reconnect sweep.
const MAX_CONCURRENT_SYNCS: usize = 4;

/// Max run ids tracked by the freshness cache.
const FRESHNESS_CAPACITY: usize = 256;

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Server truth
    Remote,
    /// Local fallback; possibly stale
    Local,
}

/// A value plus the tier that produced it.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Fetched<T> {
    fn remote(value: T) -> Self {
        Self {
            value,
            origin: Origin::Remote,
        }
    }

    fn local(value: T) -> Self {
        Self {
            value,
            origin: Origin::Local,
        }
    }

    /// True when the value came from the local fallback tier.
    pub fn possibly_stale(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// Parameters for starting a run.
#[derive(Debug, Clone, Default)]
pub struct NewRun {
    pub id: u64,
    pub event_id: Option<u64>,
    pub room_id: Option<u64>,
    pub start: Option<i64>,
}

/// Bounded map from run id to the last time the server confirmed our state.
///
/// Throttles the eager per-point flush: while an entry is fresh, appends
/// skip the network round trip and leave reconciliation to the next flush
/// window. Explicit and injected, not hidden singleton state.
#[derive(Clone)]
pub struct FreshnessCache {
    ttl: Duration,
    capacity: usize,
    inner: Arc<Mutex<FreshnessInner>>,
}

#[derive(Default)]
struct FreshnessInner {
    verified: HashMap<(u64, u64), Instant>,
    order: VecDeque<(u64, u64)>,
}

impl FreshnessCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Arc::new(Mutex::new(FreshnessInner::default())),
        }
    }

    pub fn is_fresh(&self, key: (u64, u64)) -> bool {
        let inner = self.inner.lock().expect("freshness cache poisoned");
        inner
            .verified
            .get(&key)
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    pub fn mark(&self, key: (u64, u64)) {
        let mut inner = self.inner.lock().expect("freshness cache poisoned");
        if inner.verified.insert(key, Instant::now()).is_none() {
            inner.order.push_back(key);
        }
        while inner.order.len() > self.capacity {
            // Evict by insertion order; good enough for a staleness hint.
            if let Some(oldest) = inner.order.pop_front() {
                inner.verified.remove(&oldest);
            }
        }
    }

    pub fn forget(&self, key: (u64, u64)) {
        let mut inner = self.inner.lock().expect("freshness cache poisoned");
        inner.verified.remove(&key);
        inner.order.retain(|k| *k != key);
    }
}

/// Two-tier repository over `LocalStore` and the remote run service.
pub struct CombinedRunRepository<R> {
    local: Arc<LocalStore>,
    remote: Arc<R>,
    sync: SyncEngine<R>,
    freshness: FreshnessCache,
}

impl<R> Clone for CombinedRunRepository<R> {
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            remote: self.remote.clone(),
            sync: self.sync.clone(),
            freshness: self.freshness.clone(),
        }
    }
}

impl<R: RemoteRunApi> CombinedRunRepository<R> {
    pub fn new(local: Arc<LocalStore>, remote: Arc<R>, freshness_ttl: Duration) -> Self {
        let sync = SyncEngine::new(local.clone(), remote.clone());
        Self {
            local,
            remote,
            sync,
            freshness: FreshnessCache::new(freshness_ttl, FRESHNESS_CAPACITY),
        }
    }

    /// The underlying sync engine, for explicit reconciliation calls.
    pub fn sync_engine(&self) -> &SyncEngine<R> {
        &self.sync
    }

    /// Start a run. Server-first; a disconnected create is recorded locally
    /// with an unsynced cursor and replayed when connectivity returns.
    pub async fn create(&self, user_id: u64, params: NewRun) -> Result<Fetched<Run>, AppError> {
        if self.local.get_run(user_id, params.id).is_some() {
            return Err(AppError::Conflict(format!(
                "run {} already exists locally",
                params.id
            )));
        }

        let mut run = Run::new(params.id, user_id);
        run.event_id = params.event_id;
        run.room_id = params.room_id;
        run.start = params.start;

        match self.remote.create_run(&run).await {
            Ok(()) => {
                self.local.upsert_run(&run);
                self.local.put_cursor(&SyncCursor {
                    user_id,
                    run_id: run.id,
                    since: Some(0),
                })?;
                self.freshness.mark((user_id, run.id));
                Ok(Fetched::remote(run))
            }
            Err(e) if e.retryable() => {
                tracing::warn!(user_id, run_id = run.id, error = %e,
                    "Run created offline; will sync when connected");
                self.local.upsert_run(&run);
                self.local.put_cursor(&SyncCursor::unsynced(user_id, run.id))?;
                Ok(Fetched::local(run))
            }
            Err(e) => Err(e),
        }
    }

    /// Append one sample: local-first, then an eager flush throttled by the
    /// freshness cache. A disconnected flush is swallowed; the caller's run
    /// keeps going and the cursor marks what still needs pushing.
    pub async fn append_point(
        &self,
        user_id: u64,
        run_id: u64,
        point: PathPoint,
    ) -> Result<(), AppError> {
        point
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let mut run = self
            .local
            .get_run(user_id, run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} for user {}", run_id, user_id)))?;
        if run.end.is_some() {
            return Err(AppError::Conflict(format!("run {} already finished", run_id)));
        }

        // Moving-time accumulator: time since the previous sample counts
        // unless the run was paused at that sample.
        if let Some(prev) = &run.location {
            if !prev.end && point.time > prev.time {
                run.running += point.time - prev.time;
            }
        }
        run.paused = point.end;
        run.cur = Some(point.distance);
        run.location = Some(point.clone());

        self.local.append_point(user_id, run_id, point)?;
        self.local.upsert_run(&run);

        if !self.freshness.is_fresh((user_id, run_id)) {
            match self.sync.ensure_synced(user_id, run_id).await {
                Ok(_) => self.freshness.mark((user_id, run_id)),
                Err(e) if e.retryable() => {
                    tracing::debug!(user_id, run_id, error = %e,
                        "Flush deferred; local view may be stale");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Finish a run.
    ///
    /// The finalized record lands locally first (a run must be able to end
    /// with no connectivity), then the engine flushes points and the final
    /// metadata and retires the cursor. A disconnected flush leaves the
    /// defined partially-applied state described in the module docs.
    pub async fn finish(&self, user_id: u64, run_id: u64, end: i64) -> Result<Fetched<Run>, AppError> {
        let mut run = self
            .local
            .get_run(user_id, run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} for user {}", run_id, user_id)))?;
        if run.end.is_some() {
            return Err(AppError::Conflict(format!("run {} already finished", run_id)));
        }

        if run.start.is_none() {
            // A run that never got a race clock still finishes; anchor the
            // clock on the first sample, or the end itself for empty runs.
            let first = self
                .local
                .points_since(user_id, run_id, None)
                .first()
                .map(|p| p.time);
            run.start = Some(first.unwrap_or(end));
        }
        run.end = Some(end);
        run.paused = false;

        self.local.upsert_run(&run);
        self.freshness.forget((user_id, run_id));

        match self.sync.ensure_synced(user_id, run_id).await {
            Ok(_) => Ok(Fetched::remote(run)),
            Err(e) if e.retryable() => {
                tracing::warn!(user_id, run_id, error = %e,
                    "Run finished offline; final flush pending");
                Ok(Fetched::local(run))
            }
            Err(e) => Err(e),
        }
    }

    /// The user's current (most recent unfinished) run, server-preferred.
    ///
    /// On success the local mirror is hydrated (metadata upserted and the
    /// missing point tail pulled) unless the local copy has unsynced
    /// changes, which only the sync engine may reconcile.
    pub async fn get_current(&self, user_id: u64) -> Result<Fetched<Option<Run>>, AppError> {
        match self.remote.unfinished(user_id).await {
            Ok(runs) => {
                let current = runs
                    .into_iter()
                    .max_by_key(|r| (r.start.unwrap_or(i64::MAX), r.id));
                let Some(mut run) = current else {
                    return Ok(Fetched::remote(None));
                };

                if !self.local_is_ahead(user_id, &run) {
                    self.local.upsert_run(&run);
                    let high_water = self.local.latest_point_time(user_id, run.id);
                    match self.remote.pull_points(user_id, run.id, high_water).await {
                        Ok(tail) => {
                            self.local.append_points(user_id, run.id, &tail)?;
                            self.freshness.mark((user_id, run.id));
                        }
                        Err(e) if e.retryable() => {
                            tracing::debug!(user_id, run_id = run.id, error = %e,
                                "Point hydration deferred");
                        }
                        Err(e) => return Err(e),
                    }
                }

                run.path = self.local.points_since(user_id, run.id, None);
                Ok(Fetched::remote(Some(run)))
            }
            Err(e) if e.retryable() => {
                let current = self
                    .local
                    .unfinished_runs(user_id)
                    .into_iter()
                    .max_by_key(|r| (r.start.unwrap_or(i64::MAX), r.id))
                    .map(|mut run| {
                        run.path = self.local.points_since(user_id, run.id, None);
                        run
                    });
                Ok(Fetched::local(current))
            }
            Err(e) => Err(e),
        }
    }

    /// Run history, server-preferred with local fallback.
    pub async fn get_history(
        &self,
        user_id: u64,
        since: Option<i64>,
    ) -> Result<Fetched<Vec<Run>>, AppError> {
        let result = match since {
            Some(since) => self.remote.runs_since(user_id, since).await,
            None => self.remote.runs(user_id).await,
        };
        match result {
            Ok(runs) => Ok(Fetched::remote(runs)),
            Err(e) if e.retryable() => {
                let mut runs = self.local.runs_for_user(user_id);
                if let Some(since) = since {
                    runs.retain(|r| r.start.unwrap_or(i64::MAX) > since);
                }
                Ok(Fetched::local(runs))
            }
            Err(e) => Err(e),
        }
    }

    /// Replay every run that still has a sync cursor: the recovery pass for
    /// runs created or finished while offline, surviving process restarts.
    /// Returns the number of runs brought fully up to date.
    pub async fn resync_pending(&self, user_id: u64) -> Result<usize, AppError> {
        let pending = self.local.pending_runs(user_id);
        if pending.is_empty() {
            return Ok(0);
        }

        let results: Vec<Result<SyncReport, AppError>> = stream::iter(pending)
            .map(|run_id| {
                let engine = self.sync.clone();
                async move { engine.ensure_synced(user_id, run_id).await }
            })
            .buffer_unordered(MAX_CONCURRENT_SYNCS)
            .collect()
            .await;

        let mut reconciled = 0;
        for result in results {
            match result {
                Ok(_) => reconciled += 1,
                Err(e) if e.retryable() => {
                    tracing::debug!(user_id, error = %e, "Replay still disconnected");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reconciled)
    }

    /// Whether the local copy holds changes the server has not acknowledged.
    fn local_is_ahead(&self, user_id: u64, remote_run: &Run) -> bool {
        let Some(local_run) = self.local.get_run(user_id, remote_run.id) else {
            return false;
        };
        if local_run.end.is_some() && remote_run.end.is_none() {
            return true;
        }
        match self.local.get_cursor(user_id, remote_run.id) {
            Some(cursor) => {
                let latest = self.local.latest_point_time(user_id, remote_run.id);
                match (cursor.since, latest) {
                    (Some(since), Some(latest)) => latest > since,
                    (None, Some(_)) => true,
                    _ => false,
                }
            }
            None => false,
        }
    }
}
