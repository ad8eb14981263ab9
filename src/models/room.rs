// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Race room wire types.

use serde::{Deserialize, Serialize};

/// Room lifecycle phase.
///
/// `Open` accepts joins; `AllReady` is the moment every member is ready;
/// `Started` has a fixed start timestamp; `Closed` is terminal (room
/// emptied or torn down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomPhase {
    Open,
    AllReady,
    Started,
    Closed,
}

/// Read-only snapshot of a room, broadcast to members on every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatus {
    pub room_id: u64,
    pub phase: RoomPhase,
    /// Member user IDs, sorted for stable output
    pub members: Vec<u64>,
    /// Ready user IDs (always a subset of members), sorted
    pub ready: Vec<u64>,
    /// Synchronized start (ms since epoch); set at most once
    pub start: Option<i64>,
}
