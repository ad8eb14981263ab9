// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live ranking computation and subscription.
//!
//! Ordering: non-disqualified before disqualified; within each group,
//! finished participants by elapsed time plus penalty ascending, then
//! unfinished participants by progress descending. Disqualified runs are
//! flagged and ranked last, never removed.

use crate::db::RunDb;
use crate::error::AppError;
use crate::models::{Event, Run};
use crate::time_utils::now_ms;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

use super::notify::{event_topic, room_topic, ChangeHub};

/// What a ranking is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankScope {
    Event(u64),
    Room(u64),
}

impl RankScope {
    pub fn topic(&self) -> String {
        match self {
            RankScope::Event(id) => event_topic(*id),
            RankScope::Room(id) => room_topic(*id),
        }
    }
}

/// One participant's place in a ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: u64,
    pub run_id: u64,
    pub finished: bool,
    /// `end - start` for finished runs (ms)
    pub elapsed_ms: Option<i64>,
    /// Course-deviation penalty (ms)
    pub penalty_ms: i64,
    /// Progress along the course (meters)
    pub progress_m: f64,
    /// Strayed beyond the event tolerance; ranked last but never dropped
    pub disqualified: bool,
}

impl RankingEntry {
    fn adjusted_time_ms(&self) -> i64 {
        self.elapsed_ms
            .unwrap_or(i64::MAX)
            .saturating_add(self.penalty_ms)
    }
}

/// A computed ranking snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    /// Change counter for the scope; pair with `rankingsubscribe`
    pub version: u64,
    /// When this snapshot was computed (ms since epoch)
    pub generated_at: i64,
    pub entries: Vec<RankingEntry>,
}

/// Computes and serves rankings for events and rooms.
#[derive(Clone)]
pub struct RankingService {
    db: RunDb,
    hub: ChangeHub,
}

impl RankingService {
    pub fn new(db: RunDb, hub: ChangeHub) -> Self {
        Self { db, hub }
    }

    /// Current ranking snapshot for an event or room.
    pub async fn rank(&self, scope: RankScope) -> Result<Ranking, AppError> {
        let (runs, event) = match scope {
            RankScope::Event(id) => {
                let event = self
                    .db
                    .get_event(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Event {}", id)))?;
                (self.db.runs_for_event(id).await?, Some(event))
            }
            // Rooms have no course, so no disqualification check.
            RankScope::Room(id) => (self.db.runs_for_room(id).await?, None),
        };

        Ok(Ranking {
            version: self.hub.version(&scope.topic()),
            generated_at: now_ms(),
            entries: compute_entries(&runs, event.as_ref()),
        })
    }

    /// Long-poll: wait until the scope's ranking changes from `known` (or
    /// the timeout elapses), then return the current snapshot. The caller
    /// may drop the future at any point; the waiting slot is released
    /// without touching other subscribers.
    pub async fn subscribe(
        &self,
        scope: RankScope,
        known: Option<u64>,
        timeout: Duration,
    ) -> Result<Ranking, AppError> {
        self.hub.wait(&scope.topic(), known, timeout).await;
        self.rank(scope).await
    }

    /// Signal the feeds a run contributes to, after a ranking-affecting
    /// write.
    pub fn notify_run(&self, run: &Run) {
        if let Some(event_id) = run.event_id {
            self.hub.signal(&event_topic(event_id));
        }
        if let Some(room_id) = run.room_id {
            self.hub.signal(&room_topic(room_id));
        }
    }
}

/// Rank all runs of a scope. Pure; the event supplies the course for
/// disqualification when present.
pub fn compute_entries(runs: &[Run], event: Option<&Event>) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = runs
        .iter()
        .map(|run| {
            let elapsed_ms = match (run.start, run.end) {
                (Some(start), Some(end)) => Some(end - start),
                _ => None,
            };
            RankingEntry {
                user_id: run.user_id,
                run_id: run.id,
                finished: elapsed_ms.is_some(),
                elapsed_ms,
                penalty_ms: run.penalty.unwrap_or(0),
                progress_m: run.progress_m(),
                disqualified: event.is_some_and(|e| e.exceeds_tolerance(&run.path)),
            }
        })
        .collect();
    entries.sort_by(rank_order);
    entries
}

fn rank_order(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    (a.disqualified as u8)
        .cmp(&(b.disqualified as u8))
        .then_with(|| match (a.finished, b.finished) {
            (true, true) => a.adjusted_time_ms().cmp(&b.adjusted_time_ms()),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => b.progress_m.total_cmp(&a.progress_m),
        })
        .then_with(|| a.user_id.cmp(&b.user_id))
}
