// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Virtual race course model and deviation geometry.

use geo::{Closest, ClosestPoint, Distance, Haversine, Line, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One course waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    fn point(&self) -> Point<f64> {
        // geo convention: x = lon, y = lat
        Point::new(self.lon, self.lat)
    }
}

/// A virtual race course used for ranking and disqualification checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    /// Ordered course waypoints
    pub course: Vec<Waypoint>,
    /// Target distance (meters)
    pub distance_m: f64,
    /// Max lateral deviation from the course before disqualification
    /// (meters); None disables the check
    pub tolerance_m: Option<f64>,
    /// Users following this event
    #[serde(default)]
    pub followers: HashSet<u64>,
}

impl Event {
    /// Lateral deviation of a sample from the course, in meters.
    ///
    /// Closest point on each course segment found in degree space, distance
    /// to it measured on the sphere. None for an empty course.
    pub fn deviation_m(&self, lat: f64, lon: f64) -> Option<f64> {
        let sample = Point::new(lon, lat);
        match self.course.len() {
            0 => None,
            1 => Some(Haversine.distance(sample, self.course[0].point())),
            _ => self
                .course
                .windows(2)
                .map(|seg| {
                    let line = Line::new(seg[0].point(), seg[1].point());
                    let nearest = match line.closest_point(&sample) {
                        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
                        Closest::Indeterminate => seg[0].point(),
                    };
                    Haversine.distance(sample, nearest)
                })
                .min_by(f64::total_cmp),
        }
    }

    /// Whether any sample of `path` strays beyond the tolerance.
    ///
    /// Paths are append-only, so a verdict never flips back.
    pub fn exceeds_tolerance(&self, path: &[crate::models::PathPoint]) -> bool {
        let Some(tolerance) = self.tolerance_m else {
            return false;
        };
        path.iter().any(|p| {
            self.deviation_m(p.lat, p.lon)
                .is_some_and(|d| d > tolerance)
        })
    }
}
