// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync engine: reconciles the local store with the run service.
//!
//! The cursor is the single source of truth for what the server has
//! acknowledged. It only ever moves forward, and only after an acknowledged
//! write, so an aborted or failed sync leaves every confirmed batch valid
//! and simply resumes later.

use crate::error::AppError;
use crate::models::SyncCursor;
use crate::store::LocalStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::remote::RemoteRunApi;

/// Max points per push. Each batch is acknowledged (and the cursor
/// advanced) as a unit; there is no partial acknowledgment within a batch.
const SYNC_BATCH_SIZE: usize = 200;

/// Per-(user, run) mutex registry to serialize in-flight syncs.
pub type SyncLocks = Arc<DashMap<(u64, u64), Arc<Mutex<()>>>>;

/// Outcome of one `ensure_synced` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Points newly pushed to the server
    pub pushed: usize,
    /// Whether the run was finished and fully reconciled (cursor dropped)
    pub finalized: bool,
}

/// Reconciles one run at a time between `LocalStore` and the remote service.
pub struct SyncEngine<R> {
    local: Arc<LocalStore>,
    remote: Arc<R>,
    locks: SyncLocks,
}

impl<R> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            remote: self.remote.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<R: RemoteRunApi> SyncEngine<R> {
    pub fn new(local: Arc<LocalStore>, remote: Arc<R>) -> Self {
        Self {
            local,
            remote,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Push everything the server has not acknowledged for `(user, run)`.
    ///
    /// - If the run has never been created remotely (`since == None`), it is
    ///   created first (idempotent, keyed by the client-assigned id).
    /// - Pending points are pushed oldest-first in bounded batches; the
    ///   cursor advances to each batch's max timestamp only after the server
    ///   acknowledges it.
    /// - A `NotFound` from the server mid-push means the run record is gone
    ///   remotely; it is recreated and the batch retried.
    /// - When the run is finished locally, the final metadata is flushed and
    ///   the cursor deleted: the run is fully reconciled.
    ///
    /// `Disconnected` propagates with the cursor untouched; retrying is
    /// always safe because the server deduplicates by `(user, run, time)`.
    /// At most one sync per `(user, run)` is in flight at a time.
    pub async fn ensure_synced(&self, user_id: u64, run_id: u64) -> Result<SyncReport, AppError> {
        let lock = self
            .locks
            .entry((user_id, run_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let run = self
            .local
            .get_run(user_id, run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} for user {}", run_id, user_id)))?;

        let mut cursor = self
            .local
            .get_cursor(user_id, run_id)
            .unwrap_or_else(|| SyncCursor::unsynced(user_id, run_id));

        if cursor.since.is_none() {
            self.remote.create_run(&run).await?;
            // Epoch floor: "everything at or before 0 is synced" holds
            // vacuously, and None stays reserved for "absent remotely".
            cursor.since = Some(0);
            self.local.put_cursor(&cursor)?;
            tracing::info!(user_id, run_id, "Run created remotely");
        }

        let pending = self.local.points_since(user_id, run_id, cursor.since);
        let mut pushed = 0;
        for batch in pending.chunks(SYNC_BATCH_SIZE) {
            match self.remote.push_points(user_id, run_id, batch).await {
                Ok(()) => {}
                Err(AppError::NotFound(_)) => {
                    // The server lost or dropped the run record; recreate it
                    // and push the still-pending tail.
                    tracing::warn!(user_id, run_id, "Run missing remotely, recreating");
                    self.remote.create_run(&run).await?;
                    self.remote.push_points(user_id, run_id, batch).await?;
                }
                Err(e) => return Err(e),
            }
            // Batches are timestamp-ordered, so the last point is the max.
            cursor.since = Some(batch[batch.len() - 1].time);
            self.local.put_cursor(&cursor)?;
            pushed += batch.len();
        }

        if pushed > 0 {
            tracing::debug!(user_id, run_id, pushed, since = ?cursor.since, "Points synced");
        }

        if run.end.is_some() {
            self.remote.update_run(&run).await?;
            self.local.delete_cursor(user_id, run_id);
            tracing::info!(user_id, run_id, "Run finalized and reconciled");
            return Ok(SyncReport {
                pushed,
                finalized: true,
            });
        }

        Ok(SyncReport {
            pushed,
            finalized: false,
        })
    }
}
