// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event ranking endpoints.

use crate::error::Result;
use crate::services::{RankScope, Ranking, RankingEntry};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Ranking routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/event/ranking/{event}", get(event_ranking))
        .route("/event/rankinglive/{event}", get(event_ranking_live))
        .route(
            "/event/rankingsubscribe/{event}",
            get(event_ranking_subscribe),
        )
}

/// Plain ranking snapshot: the ordered entries.
async fn event_ranking(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
) -> Result<Json<Vec<RankingEntry>>> {
    let ranking = state.ranking.rank(RankScope::Event(event_id)).await?;
    Ok(Json(ranking.entries))
}

/// Live snapshot with the feed version, the entry point for subscribing.
async fn event_ranking_live(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
) -> Result<Json<Ranking>> {
    Ok(Json(state.ranking.rank(RankScope::Event(event_id)).await?))
}

#[derive(Deserialize)]
struct SubscribeQuery {
    /// Version the caller already has; return immediately if it is stale
    version: Option<u64>,
}

/// Long-poll: block until the event's ranking changes from the caller's
/// known version (or the timeout elapses), then return the current
/// snapshot. Dropping the request releases the waiting slot.
async fn event_ranking_subscribe(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<u64>,
    Query(params): Query<SubscribeQuery>,
) -> Result<Json<Ranking>> {
    let timeout = Duration::from_millis(state.config.subscribe_timeout_ms);
    let ranking = state
        .ranking
        .subscribe(RankScope::Event(event_id), params.version, timeout)
        .await?;
    Ok(Json(ranking))
}
