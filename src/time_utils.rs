// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for timestamps.
//!
//! All wire and storage timestamps are milliseconds since the Unix epoch.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a millisecond timestamp as RFC3339 with a `Z` suffix, for logs.
pub fn format_ms_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| ms.to_string())
}
