// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Runhub: offline-first run tracking with race rooms and live rankings.
//!
//! This crate is both the backend API (run synchronization, room
//! rendezvous, ranking feeds) and the device-side reconciliation core
//! (`store::LocalStore`, `services::SyncEngine`,
//! `services::CombinedRunRepository`) that keeps a run usable with no
//! connectivity and converges with the server once it returns.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod time_utils;

use config::Config;
use db::RunDb;
use services::{ChangeHub, RankingService, RoomCoordinator};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: RunDb,
    pub rooms: RoomCoordinator,
    pub ranking: RankingService,
    pub hub: ChangeHub,
}
