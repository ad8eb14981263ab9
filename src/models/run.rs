// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Run and path-point models for storage and API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// One GPS/sensor sample within a run.
///
/// Immutable once written; ordered by `time` within a run and deduplicated
/// by `(user, run, time)` on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PathPoint {
    /// Latitude in degrees
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    /// Longitude in degrees
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,
    /// Altitude in meters
    pub alt: f64,
    /// Sample time (ms since epoch)
    pub time: i64,
    /// Pause/finish boundary: the run was paused or ended at this sample
    pub end: bool,
    /// Instantaneous speed (m/s)
    #[validate(range(min = 0.0))]
    pub speed: f64,
    /// Cumulative distance (meters)
    #[validate(range(min = 0.0))]
    pub distance: f64,
    /// Cumulative energy (kcal)
    #[validate(range(min = 0.0))]
    pub kcal: f64,
}

/// One running session, owned by one user.
///
/// The path is authoritative on the server; metadata records elsewhere carry
/// it empty and points live in their own table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Run ID (client-assigned, unique per user)
    pub id: u64,
    /// Owning user ID
    pub user_id: u64,
    /// Event this run competes in, if any
    pub event_id: Option<u64>,
    /// Race room this run belongs to, if any
    pub room_id: Option<u64>,
    /// Race-clock start (ms since epoch); None before the clock starts
    pub start: Option<i64>,
    /// Accumulated moving time (ms)
    pub running: i64,
    /// End timestamp (ms since epoch); None while in progress
    pub end: Option<i64>,
    /// Whether the run is currently paused
    pub paused: bool,
    /// Progress marker along the event course (meters)
    pub cur: Option<f64>,
    /// Time penalty for course deviations (ms)
    pub penalty: Option<i64>,
    /// Most recent sample, for quick status reads
    pub location: Option<PathPoint>,
    /// Ordered point trace (empty on metadata-only records)
    #[serde(default)]
    pub path: Vec<PathPoint>,
}

impl Run {
    /// New metadata-only run record.
    pub fn new(id: u64, user_id: u64) -> Self {
        Self {
            id,
            user_id,
            event_id: None,
            room_id: None,
            start: None,
            running: 0,
            end: None,
            paused: false,
            cur: None,
            penalty: None,
            location: None,
            path: Vec::new(),
        }
    }

    /// A run is unfinished iff its end timestamp is unset.
    pub fn is_unfinished(&self) -> bool {
        self.end.is_none()
    }

    /// Copy without the point trace, for metadata tables and listings.
    pub fn meta_only(&self) -> Self {
        Self {
            path: Vec::new(),
            ..self.clone()
        }
    }

    /// Current progress in meters: the explicit marker if set, otherwise the
    /// latest sample's cumulative distance.
    pub fn progress_m(&self) -> f64 {
        self.cur
            .or_else(|| self.location.as_ref().map(|p| p.distance))
            .unwrap_or(0.0)
    }

    /// Apply a metadata patch. A run cannot be finished before it started.
    pub fn apply_meta(&mut self, patch: &RunMetaPatch) -> Result<(), AppError> {
        if let Some(start) = patch.start {
            self.start = Some(start);
        }
        if let Some(running) = patch.running {
            self.running = running;
        }
        if let Some(paused) = patch.paused {
            self.paused = paused;
        }
        if let Some(cur) = patch.cur {
            self.cur = Some(cur);
        }
        if let Some(penalty) = patch.penalty {
            self.penalty = Some(penalty);
        }
        if let Some(location) = &patch.location {
            self.location = Some(location.clone());
        }
        if let Some(end) = patch.end {
            if self.start.is_none() {
                return Err(AppError::Validation(
                    "cannot finish a run that never started".to_string(),
                ));
            }
            self.end = Some(end);
            self.paused = false;
        }
        Ok(())
    }
}

/// Partial metadata update pushed by a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetaPatch {
    pub start: Option<i64>,
    pub running: Option<i64>,
    pub end: Option<i64>,
    pub paused: Option<bool>,
    pub cur: Option<f64>,
    pub penalty: Option<i64>,
    pub location: Option<PathPoint>,
}
