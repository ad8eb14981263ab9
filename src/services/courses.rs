// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event course loading.
//!
//! Courses are GeoJSON `LineString` features with an `id` property and
//! optional `distance` (meters) and `tolerance` (meters) properties. Loaded
//! once at startup and seeded into the run store.

use crate::db::RunDb;
use crate::error::AppError;
use crate::models::{Event, Waypoint};
use geo::{Distance, Haversine, LineString, Point};
use geojson::GeoJson;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Loaded event courses.
#[derive(Default, Clone)]
pub struct EventCatalog {
    events: Vec<Event>,
}

impl EventCatalog {
    /// Load courses from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CourseError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CourseError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load courses from a GeoJSON string.
    pub fn load_from_json(json_data: &str) -> Result<Self, CourseError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| CourseError::ParseError(e.to_string()))?;

        let mut events = Vec::new();

        if let GeoJson::FeatureCollection(collection) = geojson {
            for feature in collection.features {
                let Some(id) = feature.property("id").and_then(|v| v.as_u64()) else {
                    return Err(CourseError::MissingId);
                };

                let tolerance_m = feature.property("tolerance").and_then(|v| v.as_f64());
                let distance_prop = feature.property("distance").and_then(|v| v.as_f64());

                let Some(geom) = feature.geometry else {
                    return Err(CourseError::UnsupportedGeometry);
                };
                let line: LineString<f64> = geom
                    .value
                    .try_into()
                    .map_err(|_| CourseError::UnsupportedGeometry)?;

                let course: Vec<Waypoint> = line
                    .coords()
                    .map(|c| Waypoint { lat: c.y, lon: c.x })
                    .collect();

                events.push(Event {
                    id,
                    distance_m: distance_prop.unwrap_or_else(|| course_length_m(&course)),
                    tolerance_m,
                    course,
                    followers: HashSet::new(),
                });
            }
        }

        tracing::info!(count = events.len(), "Loaded event courses");
        Ok(Self { events })
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Seed every loaded course into the run store.
    pub async fn seed(&self, db: &RunDb) -> Result<(), AppError> {
        for event in &self.events {
            db.upsert_event(event).await?;
        }
        Ok(())
    }
}

/// Course length as the haversine sum over consecutive waypoints.
fn course_length_m(course: &[Waypoint]) -> f64 {
    course
        .windows(2)
        .map(|seg| {
            Haversine.distance(
                Point::new(seg[0].lon, seg[0].lat),
                Point::new(seg[1].lon, seg[1].lat),
            )
        })
        .sum()
}

/// Errors from course loading.
#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("Course feature is missing a numeric 'id' property")]
    MissingId,

    #[error("Unsupported geometry type (expected LineString)")]
    UnsupportedGeometry,
}
