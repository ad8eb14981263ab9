// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Race room coordinator: membership, readiness, synchronized start.
//!
//! Rooms live in a concurrent map keyed by room id; every mutation runs
//! under the room's exclusive entry, so transitions for one room are totally
//! ordered, every ready member is always a member, and the start is set at
//! most once under any interleaving. Status reads snapshot the latest state.
//! Every change is broadcast to members through the change hub.

use crate::error::AppError;
use crate::models::{RoomPhase, RoomStatus};
use crate::time_utils::{format_ms_rfc3339, now_ms};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::notify::{room_topic, ChangeHub};

struct RoomState {
    members: HashSet<u64>,
    ready: HashSet<u64>,
    start: Option<i64>,
    phase: RoomPhase,
}

impl RoomState {
    fn new(creator: u64) -> Self {
        Self {
            members: HashSet::from([creator]),
            ready: HashSet::new(),
            start: None,
            phase: RoomPhase::Open,
        }
    }

    fn snapshot(&self, room_id: u64) -> RoomStatus {
        let mut members: Vec<u64> = self.members.iter().copied().collect();
        let mut ready: Vec<u64> = self.ready.iter().copied().collect();
        members.sort_unstable();
        ready.sort_unstable();
        RoomStatus {
            room_id,
            phase: self.phase,
            members,
            ready,
            start: self.start,
        }
    }

    /// Fix the start if every member is ready.
    ///
    /// Runs after every membership or readiness mutation. The timestamp is
    /// fixed inside the same serialized mutation that completes the ready
    /// set, so the room passes through `AllReady` straight to `Started`;
    /// once fixed the start never changes.
    fn maybe_start(&mut self, countdown_ms: i64) {
        if self.start.is_some() || self.members.is_empty() {
            return;
        }
        if self.ready == self.members {
            self.phase = RoomPhase::AllReady;
            self.start = Some(now_ms() + countdown_ms);
            self.phase = RoomPhase::Started;
        }
    }
}

/// Server-side room registry.
#[derive(Clone)]
pub struct RoomCoordinator {
    rooms: Arc<DashMap<u64, RoomState>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
    countdown_ms: i64,
    hub: ChangeHub,
}

impl RoomCoordinator {
    pub fn new(capacity: usize, countdown_ms: i64, hub: ChangeHub) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity,
            countdown_ms,
            hub,
        }
    }

    /// Create a room with the creator as its first member.
    pub fn create(&self, user_id: u64) -> RoomStatus {
        let room_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = RoomState::new(user_id);
        let status = state.snapshot(room_id);
        self.rooms.insert(room_id, state);
        tracing::info!(room_id, user_id, "Room created");
        status
    }

    /// Join a room. Idempotent for existing members; fails once the start
    /// is fixed or the room is full.
    pub fn join(&self, user_id: u64, room_id: u64) -> Result<RoomStatus, AppError> {
        let status = {
            let mut entry = self.room_mut(room_id)?;
            let state = entry.value_mut();
            if state.start.is_some() {
                return Err(AppError::Conflict(format!("room {} already started", room_id)));
            }
            if !state.members.contains(&user_id) {
                if state.members.len() >= self.capacity {
                    return Err(AppError::Conflict(format!("room {} is full", room_id)));
                }
                state.members.insert(user_id);
            }
            state.snapshot(room_id)
        };
        self.hub.signal(&room_topic(room_id));
        tracing::debug!(room_id, user_id, "Member joined");
        Ok(status)
    }

    /// Mark a member ready. Idempotent; the second `ready` from the same
    /// user never double-counts toward "all ready". Completing the ready
    /// set fixes the synchronized start exactly once.
    pub fn ready(&self, user_id: u64, room_id: u64) -> Result<RoomStatus, AppError> {
        let status = {
            let mut entry = self.room_mut(room_id)?;
            let state = entry.value_mut();
            if state.start.is_some() {
                return Err(AppError::Conflict(format!("room {} already started", room_id)));
            }
            if !state.members.contains(&user_id) {
                return Err(AppError::Conflict(format!(
                    "user {} is not a member of room {}",
                    user_id, room_id
                )));
            }
            state.ready.insert(user_id);
            state.maybe_start(self.countdown_ms);
            state.snapshot(room_id)
        };
        self.hub.signal(&room_topic(room_id));
        if let Some(start) = status.start {
            tracing::info!(room_id, start = %format_ms_rfc3339(start), "All members ready; start fixed");
        }
        Ok(status)
    }

    /// Leave a room. Valid while the start is unset; an emptied room is
    /// destroyed. If the remaining members all happen to be ready, the
    /// start fires; the check runs after every membership mutation.
    pub fn leave(&self, user_id: u64, room_id: u64) -> Result<RoomStatus, AppError> {
        let status = {
            let mut entry = self.room_mut(room_id)?;
            let state = entry.value_mut();
            if state.start.is_some() {
                return Err(AppError::Conflict(format!("room {} already started", room_id)));
            }
            if !state.members.remove(&user_id) {
                return Err(AppError::Conflict(format!(
                    "user {} is not a member of room {}",
                    user_id, room_id
                )));
            }
            state.ready.remove(&user_id);
            if state.phase == RoomPhase::AllReady && state.ready != state.members {
                state.phase = RoomPhase::Open;
            }
            if state.members.is_empty() {
                state.phase = RoomPhase::Closed;
            } else {
                state.maybe_start(self.countdown_ms);
            }
            state.snapshot(room_id)
        };

        if status.phase == RoomPhase::Closed {
            self.rooms.remove(&room_id);
            tracing::info!(room_id, "Room emptied and closed");
        }
        self.hub.signal(&room_topic(room_id));
        tracing::debug!(room_id, user_id, "Member left");
        Ok(status)
    }

    /// Read-only snapshot, available in any state.
    pub fn status(&self, room_id: u64) -> Result<RoomStatus, AppError> {
        self.rooms
            .get(&room_id)
            .map(|state| state.snapshot(room_id))
            .ok_or_else(|| AppError::NotFound(format!("Room {}", room_id)))
    }

    fn room_mut(
        &self,
        room_id: u64,
    ) -> Result<dashmap::mapref::one::RefMut<'_, u64, RoomState>, AppError> {
        self.rooms
            .get_mut(&room_id)
            .ok_or_else(|| AppError::NotFound(format!("Room {}", room_id)))
    }
}
