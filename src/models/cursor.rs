//! Sync cursor model: the per-run watermark for confirmed pushes.

use serde::{Deserialize, Serialize};

/// Synchronization frontier for one `(user, run)` pair.
///
/// `since == None` means the run has never been created on the server.
/// `since == Some(t)` means every point with `time <= t` is confirmed
/// synced; points with `time > t` are pending. Advanced only after a server
/// acknowledgment, strictly monotonically; deleted once a finished run is
/// fully reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub user_id: u64,
    pub run_id: u64,
    pub since: Option<i64>,
}

impl SyncCursor {
    /// Fresh cursor for a run that only exists locally.
    pub fn unsynced(user_id: u64, run_id: u64) -> Self {
        Self {
            user_id,
            run_id,
            since: None,
        }
    }

    /// Whether `next` is a legal successor of this cursor.
    ///
    /// `None -> Some(_)` is the create transition; `Some(t) -> Some(u)`
    /// requires `u >= t`. Moving back to `None` or to a smaller watermark is
    /// a regression.
    pub fn allows(&self, next: Option<i64>) -> bool {
        match (self.since, next) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(cur), Some(next)) => next >= cur,
        }
    }
}
