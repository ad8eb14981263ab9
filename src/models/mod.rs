// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod cursor;
pub mod event;
pub mod room;
pub mod run;

pub use cursor::SyncCursor;
pub use event::{Event, Waypoint};
pub use room::{RoomPhase, RoomStatus};
pub use run::{PathPoint, Run, RunMetaPatch};
