// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Race room endpoints.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::RoomStatus;
use crate::services::notify::room_topic;
use crate::services::RankScope;
use crate::services::Ranking;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Room routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/room/create", get(create_room))
        .route("/room/join/{room}", get(join_room))
        .route("/room/ready/{room}", get(ready_room))
        .route("/room/leave/{room}", get(leave_room))
        .route("/room/status/{room}", get(room_status))
        .route("/room/statuswait/{room}", get(room_status_wait))
        .route("/room/ranking/{room}", get(room_ranking))
}

/// Create a room with the caller as its first member.
async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RoomStatus>> {
    Ok(Json(state.rooms.create(user.user_id)))
}

async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<u64>,
) -> Result<Json<RoomStatus>> {
    Ok(Json(state.rooms.join(user.user_id, room_id)?))
}

async fn ready_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<u64>,
) -> Result<Json<RoomStatus>> {
    Ok(Json(state.rooms.ready(user.user_id, room_id)?))
}

async fn leave_room(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<u64>,
) -> Result<Json<RoomStatus>> {
    Ok(Json(state.rooms.leave(user.user_id, room_id)?))
}

async fn room_status(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<u64>,
) -> Result<Json<RoomStatus>> {
    Ok(Json(state.rooms.status(room_id)?))
}

// ─── Broadcast leg ───────────────────────────────────────────

#[derive(Deserialize)]
struct WaitQuery {
    /// Version the caller already has; return immediately if it is stale
    version: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomStatusWaitResponse {
    pub version: u64,
    pub status: RoomStatus,
}

/// Long-poll on room changes: block until the room's state changes from the
/// caller's known version (or the timeout elapses), then return the current
/// snapshot. This is how joins, readies, and the fixed start reach every
/// member.
async fn room_status_wait(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<u64>,
    Query(params): Query<WaitQuery>,
) -> Result<Json<RoomStatusWaitResponse>> {
    let timeout = Duration::from_millis(state.config.subscribe_timeout_ms);
    let version = state
        .hub
        .wait(&room_topic(room_id), params.version, timeout)
        .await;
    let status = state.rooms.status(room_id)?;
    Ok(Json(RoomStatusWaitResponse { version, status }))
}

/// Live ranking over the room's runs. Rooms carry no course, so there is no
/// disqualification here.
async fn room_ranking(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<u64>,
) -> Result<Json<Ranking>> {
    Ok(Json(state.ranking.rank(RankScope::Room(room_id)).await?))
}
