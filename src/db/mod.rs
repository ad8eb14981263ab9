//! Database layer (authoritative run store).

pub mod run_db;

pub use run_db::{RunDb, RunQueryCursor};
