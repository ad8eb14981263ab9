// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod courses;
pub mod notify;
pub mod ranking;
pub mod remote;
pub mod repository;
pub mod rooms;
pub mod sync;

pub use courses::EventCatalog;
pub use notify::ChangeHub;
pub use ranking::{RankScope, Ranking, RankingEntry, RankingService};
pub use remote::{RemoteRunApi, RunApiClient};
pub use repository::{CombinedRunRepository, Fetched, FreshnessCache, NewRun, Origin};
pub use rooms::RoomCoordinator;
pub use sync::{SyncEngine, SyncReport};
