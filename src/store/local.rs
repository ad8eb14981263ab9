// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device-side store for runs, path points, and sync cursors.
//!
//! Owns the client copy of run state for the lifetime of the installation.
//! Persisted schema: a point table keyed by `(user, run, time)` and a
//! cursor table keyed by `(user, run)` holding a nullable `since`. The
//! storage engine behind these tables is a keyed-CRUD boundary; the
//! in-process implementation is concurrent maps with the same surface.

use crate::error::AppError;
use crate::models::{PathPoint, Run, SyncCursor};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Client-side run store.
#[derive(Default)]
pub struct LocalStore {
    runs: DashMap<(u64, u64), Run>,
    points: DashMap<(u64, u64), BTreeMap<i64, PathPoint>>,
    cursors: DashMap<(u64, u64), SyncCursor>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Run Operations ──────────────────────────────────────────

    /// Store a run's metadata record (path stripped).
    pub fn upsert_run(&self, run: &Run) {
        self.runs.insert((run.user_id, run.id), run.meta_only());
    }

    pub fn get_run(&self, user_id: u64, run_id: u64) -> Option<Run> {
        self.runs.get(&(user_id, run_id)).map(|r| r.clone())
    }

    /// All of a user's locally known runs, newest first.
    pub fn runs_for_user(&self, user_id: u64) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.value().clone())
            .collect();
        runs.sort_by(|a, b| {
            (b.start.unwrap_or(i64::MAX), b.id).cmp(&(a.start.unwrap_or(i64::MAX), a.id))
        });
        runs
    }

    pub fn unfinished_runs(&self, user_id: u64) -> Vec<Run> {
        let mut runs = self.runs_for_user(user_id);
        runs.retain(Run::is_unfinished);
        runs
    }

    /// Runs that still have a sync cursor, i.e. are not fully reconciled
    /// with the server.
    pub fn pending_runs(&self, user_id: u64) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .cursors
            .iter()
            .filter(|e| e.key().0 == user_id)
            .map(|e| e.key().1)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Remove a run with its points and cursor.
    pub fn delete_run(&self, user_id: u64, run_id: u64) {
        let key = (user_id, run_id);
        self.runs.remove(&key);
        self.points.remove(&key);
        self.cursors.remove(&key);
    }

    // ─── PathPoint Operations ────────────────────────────────────

    /// Append one sample. Appends must arrive in non-decreasing timestamp
    /// order; a re-append on an existing timestamp is an idempotent no-op.
    pub fn append_point(&self, user_id: u64, run_id: u64, point: PathPoint) -> Result<(), AppError> {
        let mut trace = self.points.entry((user_id, run_id)).or_default();
        if let Some((&latest, _)) = trace.iter().next_back() {
            if point.time < latest {
                return Err(AppError::Validation(format!(
                    "point at {} is older than latest sample {}",
                    point.time, latest
                )));
            }
        }
        trace.insert(point.time, point);
        Ok(())
    }

    pub fn append_points(
        &self,
        user_id: u64,
        run_id: u64,
        batch: &[PathPoint],
    ) -> Result<(), AppError> {
        for point in batch {
            self.append_point(user_id, run_id, point.clone())?;
        }
        Ok(())
    }

    /// Points with `time > since` in timestamp order (exclusive-below);
    /// `None` returns the full trace.
    pub fn points_since(&self, user_id: u64, run_id: u64, since: Option<i64>) -> Vec<PathPoint> {
        let Some(trace) = self.points.get(&(user_id, run_id)) else {
            return Vec::new();
        };
        match since {
            Some(since) => trace
                .range((Bound::Excluded(since), Bound::Unbounded))
                .map(|(_, p)| p.clone())
                .collect(),
            None => trace.values().cloned().collect(),
        }
    }

    pub fn latest_point_time(&self, user_id: u64, run_id: u64) -> Option<i64> {
        self.points
            .get(&(user_id, run_id))
            .and_then(|trace| trace.keys().next_back().copied())
    }

    pub fn point_count(&self, user_id: u64, run_id: u64) -> usize {
        self.points
            .get(&(user_id, run_id))
            .map(|trace| trace.len())
            .unwrap_or(0)
    }

    // ─── SyncCursor Operations ───────────────────────────────────

    pub fn get_cursor(&self, user_id: u64, run_id: u64) -> Option<SyncCursor> {
        self.cursors.get(&(user_id, run_id)).map(|c| c.clone())
    }

    /// Store a cursor, enforcing forward-only movement.
    ///
    /// A regression means the store no longer agrees with what the server
    /// already acknowledged; that is corruption, not a retryable condition.
    pub fn put_cursor(&self, cursor: &SyncCursor) -> Result<(), AppError> {
        let key = (cursor.user_id, cursor.run_id);
        if let Some(existing) = self.cursors.get(&key) {
            if !existing.allows(cursor.since) {
                return Err(AppError::Fatal(format!(
                    "sync cursor for run {} would move from {:?} to {:?}",
                    cursor.run_id, existing.since, cursor.since
                )));
            }
        }
        self.cursors.insert(key, cursor.clone());
        Ok(())
    }

    /// Drop a cursor once its run is fully reconciled.
    pub fn delete_cursor(&self, user_id: u64, run_id: u64) {
        self.cursors.remove(&(user_id, run_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(time: i64) -> PathPoint {
        PathPoint {
            lat: 37.4,
            lon: -122.1,
            alt: 30.0,
            time,
            end: false,
            speed: 3.0,
            distance: time as f64,
            kcal: 1.0,
        }
    }

    #[test]
    fn test_append_rejects_out_of_order_point() {
        let store = LocalStore::new();
        store.append_point(42, 1, point(1_000)).unwrap();
        let err = store.append_point(42, 1, point(900)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Same-timestamp re-append is fine.
        store.append_point(42, 1, point(1_000)).unwrap();
        assert_eq!(store.point_count(42, 1), 1);
    }

    #[test]
    fn test_points_since_exclusive_below() {
        let store = LocalStore::new();
        store.append_points(42, 1, &[point(100), point(200)]).unwrap();
        assert_eq!(store.points_since(42, 1, Some(99)).len(), 2);
        assert_eq!(store.points_since(42, 1, Some(100)).len(), 1);
        assert_eq!(store.points_since(42, 1, Some(200)).len(), 0);
        assert_eq!(store.latest_point_time(42, 1), Some(200));
    }

    #[test]
    fn test_cursor_regression_is_fatal() {
        let store = LocalStore::new();
        let mut cursor = SyncCursor::unsynced(42, 1);
        store.put_cursor(&cursor).unwrap();

        cursor.since = Some(500);
        store.put_cursor(&cursor).unwrap();

        cursor.since = Some(400);
        let err = store.put_cursor(&cursor).unwrap_err();
        assert!(matches!(err, AppError::Fatal(_)));

        // The stored cursor is untouched by the rejected write.
        assert_eq!(store.get_cursor(42, 1).unwrap().since, Some(500));
    }

    #[test]
    fn test_pending_runs_follow_cursor_lifetime() {
        let store = LocalStore::new();
        let run = Run::new(1, 42);
        store.upsert_run(&run);
        assert!(store.pending_runs(42).is_empty());

        store.put_cursor(&SyncCursor::unsynced(42, 1)).unwrap();
        assert_eq!(store.pending_runs(42), vec![1]);

        store.delete_cursor(42, 1);
        assert!(store.pending_runs(42).is_empty());
    }

    #[test]
    fn test_delete_run_cascades() {
        let store = LocalStore::new();
        store.upsert_run(&Run::new(1, 42));
        store.append_point(42, 1, point(100)).unwrap();
        store.put_cursor(&SyncCursor::unsynced(42, 1)).unwrap();

        store.delete_run(42, 1);
        assert!(store.get_run(42, 1).is_none());
        assert_eq!(store.point_count(42, 1), 0);
        assert!(store.get_cursor(42, 1).is_none());
    }
}
