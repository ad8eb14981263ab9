// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run synchronization endpoints.
//!
//! Everything here is scoped to the authenticated user; clients push point
//! batches and metadata, and pull cursor-delimited updates. The wire types
//! double as the contract for `RunApiClient`.

use crate::db::RunQueryCursor;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{PathPoint, Run, RunMetaPatch};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Run routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run/create", post(create_run))
        .route("/run/update", post(update_run))
        .route("/run/getupdate", get(get_update))
        .route("/run/all", get(all_runs))
        .route("/run/since", get(runs_since))
        .route("/run/unfinished", get(unfinished_runs))
        .route("/run/delete/{id}", get(delete_run))
}

// ─── Create ──────────────────────────────────────────────────

/// Create-if-absent payload, keyed by the client-assigned run id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub id: u64,
    /// Event the run competes in
    pub event: Option<u64>,
    /// Race room the run belongs to
    pub room: Option<u64>,
    /// Race-clock start (ms since epoch)
    pub start: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRunResponse {
    /// False when the run already existed (idempotent retry)
    pub created: bool,
    pub run: Run,
}

/// Create a run for the current user. Idempotent: retried creates return
/// the existing record untouched.
async fn create_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>> {
    let mut run = Run::new(payload.id, user.user_id);
    run.event_id = payload.event;
    run.room_id = payload.room;
    run.start = payload.start;

    let created = state.db.create_run(&run).await?;
    let run = state
        .db
        .get_run(user.user_id, payload.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Run {}", payload.id)))?;

    if created {
        // A new participant is a ranking-affecting change.
        state.ranking.notify_run(&run);
    }

    Ok(Json(CreateRunResponse { created, run }))
}

// ─── Update (points + metadata) ──────────────────────────────

/// Push payload: a batch of points and/or a metadata patch.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunUpdateRequest {
    pub run: u64,
    /// Timestamp-ordered point batch; acknowledged atomically
    #[serde(default)]
    #[validate(nested)]
    pub points: Vec<PathPoint>,
    pub meta: Option<RunMetaPatch>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunUpdateResponse {
    /// Points newly stored (re-pushed duplicates are not counted)
    pub accepted: usize,
}

/// Push a batch of points and/or metadata for one of the user's runs.
///
/// The batch is accepted as a unit: a malformed or unordered batch is
/// rejected whole, so a syncing client's cursor never straddles a batch.
async fn update_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<RunUpdateRequest>,
) -> Result<Json<RunUpdateResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if payload.points.windows(2).any(|w| w[0].time > w[1].time) {
        return Err(AppError::Validation(
            "point batch is not in timestamp order".to_string(),
        ));
    }

    let accepted = state
        .db
        .append_points(user.user_id, payload.run, &payload.points)
        .await?;

    let run = match &payload.meta {
        Some(meta) => state.db.apply_meta(user.user_id, payload.run, meta).await?,
        None => state
            .db
            .get_run(user.user_id, payload.run)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Run {}", payload.run)))?,
    };

    if accepted > 0 || payload.meta.is_some() {
        state.ranking.notify_run(&run);
    }

    Ok(Json(RunUpdateResponse { accepted }))
}

// ─── Pull (cursor-delimited points) ──────────────────────────

#[derive(Deserialize)]
struct GetUpdateQuery {
    run: u64,
    /// Exclusive-below watermark: only points with `time > since` return
    since: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointsResponse {
    pub run: u64,
    pub points: Vec<PathPoint>,
    /// Timestamp of the newest returned point, for the next pull
    pub latest: Option<i64>,
}

/// Pull points newer than the caller's watermark.
async fn get_update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<GetUpdateQuery>,
) -> Result<Json<PointsResponse>> {
    let points = state
        .db
        .points_since(user.user_id, params.run, params.since)
        .await?;
    let latest = points.last().map(|p| p.time);
    Ok(Json(PointsResponse {
        run: params.run,
        points,
        latest,
    }))
}

// ─── Listings ────────────────────────────────────────────────

#[derive(Deserialize)]
struct AllRunsQuery {
    /// Cursor for forward pagination (opaque token)
    cursor: Option<String>,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_per_page() -> u32 {
    50
}

const MAX_PER_PAGE: u32 = 100;
const CURSOR_PARTS: usize = 2;

fn parse_cursor(cursor: Option<&str>) -> Result<Option<RunQueryCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor =
                || AppError::Validation("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            let parts: Vec<&str> = decoded_str.split(':').collect();
            if parts.len() != CURSOR_PARTS {
                return Err(invalid_cursor());
            }

            let start_sort = parts[0].parse::<i64>().map_err(|_| invalid_cursor())?;
            let run_id = parts[1].parse::<u64>().map_err(|_| invalid_cursor())?;

            Ok(RunQueryCursor { start_sort, run_id })
        })
        .transpose()
}

fn encode_cursor(cursor: RunQueryCursor) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", cursor.start_sort, cursor.run_id))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunsResponse {
    pub runs: Vec<Run>,
    pub per_page: u32,
    pub next_cursor: Option<String>,
}

/// List the user's runs, newest first, cursor-paginated.
async fn all_runs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<AllRunsQuery>,
) -> Result<Json<RunsResponse>> {
    let limit = params.per_page.min(MAX_PER_PAGE).max(1);
    let cursor = parse_cursor(params.cursor.as_deref())?;

    // Fetch one extra item to determine if another page is available.
    let mut runs = state
        .db
        .runs_page(user.user_id, cursor, limit.saturating_add(1))
        .await?;

    let has_more = runs.len() > limit as usize;
    if has_more {
        runs.truncate(limit as usize);
    }

    let next_cursor = if has_more {
        runs.last().map(|r| {
            encode_cursor(RunQueryCursor {
                start_sort: r.start.unwrap_or(i64::MAX),
                run_id: r.id,
            })
        })
    } else {
        None
    };

    Ok(Json(RunsResponse {
        runs,
        per_page: limit,
        next_cursor,
    }))
}

#[derive(Deserialize)]
struct RunsSinceQuery {
    since: i64,
}

/// Runs started after the given timestamp.
async fn runs_since(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<RunsSinceQuery>,
) -> Result<Json<Vec<Run>>> {
    Ok(Json(state.db.runs_since(user.user_id, params.since).await?))
}

/// Runs with no end timestamp.
async fn unfinished_runs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Run>>> {
    Ok(Json(state.db.unfinished_runs(user.user_id).await?))
}

// ─── Delete ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRunResponse {
    pub deleted: bool,
}

/// Delete one of the user's runs.
async fn delete_run(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(run_id): Path<u64>,
) -> Result<Json<DeleteRunResponse>> {
    let run = state.db.get_run(user.user_id, run_id).await?;
    let deleted = state.db.delete_run(user.user_id, run_id).await?;
    if let Some(run) = run {
        // Removal changes any ranking the run participated in.
        state.ranking.notify_run(&run);
    }
    Ok(Json(DeleteRunResponse { deleted }))
}
