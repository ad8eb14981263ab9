// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authoritative run store with typed operations.
//!
//! Provides high-level operations for:
//! - Runs (per-user metadata records)
//! - PathPoints (ordered traces, deduplicated by timestamp)
//! - Events (race courses for ranking)
//!
//! The backing engine is a keyed-CRUD boundary; the tables here are
//! process-local concurrent maps with the same method surface a durable
//! engine would expose. Run metadata and point traces live in separate
//! tables so listings stay cheap.

use crate::error::AppError;
use crate::models::{Event, PathPoint, Run, RunMetaPatch};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cursor for forward pagination of run listings.
///
/// Runs are ordered newest-first by `(start, id)`; unstarted runs sort
/// newest. The cursor names the last run of the previous page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunQueryCursor {
    /// Sort timestamp: the run's start, or `i64::MAX` when unstarted
    pub start_sort: i64,
    pub run_id: u64,
}

fn sort_key(run: &Run) -> (i64, u64) {
    (run.start.unwrap_or(i64::MAX), run.id)
}

/// Authoritative run database handle.
#[derive(Clone, Default)]
pub struct RunDb {
    runs: Arc<DashMap<(u64, u64), Run>>,
    points: Arc<DashMap<(u64, u64), BTreeMap<i64, PathPoint>>>,
    events: Arc<DashMap<u64, Event>>,
}

impl RunDb {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Run Operations ──────────────────────────────────────────

    /// Create a run if absent, keyed by the client-assigned id.
    ///
    /// Idempotent: returns `true` if the run was newly created, `false` if
    /// it already existed (the existing record is left untouched, so retried
    /// creates never clobber synced state).
    pub async fn create_run(&self, run: &Run) -> Result<bool, AppError> {
        let key = (run.user_id, run.id);
        if self.runs.contains_key(&key) {
            return Ok(false);
        }
        self.runs.insert(key, run.meta_only());
        tracing::debug!(user_id = run.user_id, run_id = run.id, "Run created");
        Ok(true)
    }

    /// Replace a run's metadata record. The point trace is unaffected.
    pub async fn update_run(&self, run: &Run) -> Result<(), AppError> {
        let key = (run.user_id, run.id);
        if !self.runs.contains_key(&key) {
            return Err(AppError::NotFound(format!(
                "Run {} for user {}",
                run.id, run.user_id
            )));
        }
        self.runs.insert(key, run.meta_only());
        Ok(())
    }

    /// Apply a metadata patch and return the updated record.
    pub async fn apply_meta(
        &self,
        user_id: u64,
        run_id: u64,
        patch: &RunMetaPatch,
    ) -> Result<Run, AppError> {
        let mut entry = self
            .runs
            .get_mut(&(user_id, run_id))
            .ok_or_else(|| AppError::NotFound(format!("Run {} for user {}", run_id, user_id)))?;
        entry.value_mut().apply_meta(patch)?;
        Ok(entry.value().clone())
    }

    /// Get a run's metadata record.
    pub async fn get_run(&self, user_id: u64, run_id: u64) -> Result<Option<Run>, AppError> {
        Ok(self.runs.get(&(user_id, run_id)).map(|r| r.clone()))
    }

    /// Get a run hydrated with its full point trace.
    pub async fn get_run_with_path(
        &self,
        user_id: u64,
        run_id: u64,
    ) -> Result<Option<Run>, AppError> {
        let Some(mut run) = self.get_run(user_id, run_id).await? else {
            return Ok(None);
        };
        run.path = self.points_since(user_id, run_id, None).await?;
        Ok(Some(run))
    }

    /// All runs for a user, newest first.
    pub async fn runs_for_user(&self, user_id: u64) -> Result<Vec<Run>, AppError> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.value().clone())
            .collect();
        runs.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        Ok(runs)
    }

    /// One page of a user's runs, newest first, strictly after `cursor`.
    pub async fn runs_page(
        &self,
        user_id: u64,
        cursor: Option<RunQueryCursor>,
        limit: u32,
    ) -> Result<Vec<Run>, AppError> {
        let mut runs = self.runs_for_user(user_id).await?;
        if let Some(cursor) = cursor {
            let boundary = (cursor.start_sort, cursor.run_id);
            runs.retain(|r| sort_key(r) < boundary);
        }
        runs.truncate(limit as usize);
        Ok(runs)
    }

    /// Runs started (or created, for unstarted runs) after `since`.
    pub async fn runs_since(&self, user_id: u64, since: i64) -> Result<Vec<Run>, AppError> {
        let mut runs = self.runs_for_user(user_id).await?;
        runs.retain(|r| r.start.unwrap_or(i64::MAX) > since);
        Ok(runs)
    }

    /// Runs with no end timestamp, newest first.
    pub async fn unfinished_runs(&self, user_id: u64) -> Result<Vec<Run>, AppError> {
        let mut runs = self.runs_for_user(user_id).await?;
        runs.retain(Run::is_unfinished);
        Ok(runs)
    }

    /// Delete a run and its point trace.
    pub async fn delete_run(&self, user_id: u64, run_id: u64) -> Result<bool, AppError> {
        let key = (user_id, run_id);
        let existed = self.runs.remove(&key).is_some();
        self.points.remove(&key);
        if existed {
            tracing::info!(user_id, run_id, "Run deleted");
        }
        Ok(existed)
    }

    // ─── PathPoint Operations ────────────────────────────────────

    /// Append a batch of points, deduplicated by `(user, run, time)`.
    ///
    /// At-least-once pushes from clients stay idempotent: a re-pushed point
    /// lands on its existing timestamp key. Returns the number of newly
    /// inserted points. `NotFound` if the run record is absent, which tells
    /// a syncing client to recreate the run before pushing.
    pub async fn append_points(
        &self,
        user_id: u64,
        run_id: u64,
        batch: &[PathPoint],
    ) -> Result<usize, AppError> {
        let key = (user_id, run_id);
        if !self.runs.contains_key(&key) {
            return Err(AppError::NotFound(format!(
                "Run {} for user {}",
                run_id, user_id
            )));
        }

        let mut trace = self.points.entry(key).or_default();
        let mut accepted = 0;
        for point in batch {
            if trace.insert(point.time, point.clone()).is_none() {
                accepted += 1;
            }
        }
        let newest = trace.values().next_back().cloned();
        drop(trace);

        // Keep the metadata record's latest-sample mirror current.
        if let Some(newest) = newest {
            if let Some(mut run) = self.runs.get_mut(&key) {
                let stale = run
                    .location
                    .as_ref()
                    .is_none_or(|loc| loc.time < newest.time);
                if stale {
                    run.paused = newest.end;
                    run.location = Some(newest);
                }
            }
        }

        tracing::debug!(user_id, run_id, accepted, batch = batch.len(), "Points appended");
        Ok(accepted)
    }

    /// Points with `time > since`, in timestamp order (exclusive-below).
    /// `None` returns the full trace.
    pub async fn points_since(
        &self,
        user_id: u64,
        run_id: u64,
        since: Option<i64>,
    ) -> Result<Vec<PathPoint>, AppError> {
        let key = (user_id, run_id);
        if !self.runs.contains_key(&key) {
            return Err(AppError::NotFound(format!(
                "Run {} for user {}",
                run_id, user_id
            )));
        }
        let Some(trace) = self.points.get(&key) else {
            return Ok(Vec::new());
        };
        let points = match since {
            Some(since) => trace
                .range((std::ops::Bound::Excluded(since), std::ops::Bound::Unbounded))
                .map(|(_, p)| p.clone())
                .collect(),
            None => trace.values().cloned().collect(),
        };
        Ok(points)
    }

    // ─── Ranking Queries ─────────────────────────────────────────

    /// All runs competing in an event, across users, hydrated with paths.
    pub async fn runs_for_event(&self, event_id: u64) -> Result<Vec<Run>, AppError> {
        self.hydrated_where(|r| r.event_id == Some(event_id)).await
    }

    /// All runs belonging to a race room, across users, hydrated with paths.
    pub async fn runs_for_room(&self, room_id: u64) -> Result<Vec<Run>, AppError> {
        self.hydrated_where(|r| r.room_id == Some(room_id)).await
    }

    async fn hydrated_where<F: Fn(&Run) -> bool>(&self, pred: F) -> Result<Vec<Run>, AppError> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect();
        for run in &mut runs {
            run.path = self.points_since(run.user_id, run.id, None).await?;
        }
        runs.sort_by_key(|r| (r.user_id, r.id));
        Ok(runs)
    }

    // ─── Event Operations ────────────────────────────────────────

    pub async fn upsert_event(&self, event: &Event) -> Result<(), AppError> {
        self.events.insert(event.id, event.clone());
        Ok(())
    }

    pub async fn get_event(&self, event_id: u64) -> Result<Option<Event>, AppError> {
        Ok(self.events.get(&event_id).map(|e| e.clone()))
    }
}
