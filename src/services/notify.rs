// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Topic-keyed change notification hub.
//!
//! The cooperative wait primitive behind long-poll subscriptions: waiters
//! register interest on a topic, a ranking- or room-affecting update signals
//! all of them, and each resolves with the topic's version (or on timeout
//! with the unchanged one). No busy polling; a dropped waiter releases its
//! slot without affecting anyone else.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct Topic {
    notify: Arc<Notify>,
    version: u64,
}

impl Default for Topic {
    fn default() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
            version: 0,
        }
    }
}

/// Shared notification hub, cheap to clone.
#[derive(Clone, Default)]
pub struct ChangeHub {
    topics: Arc<DashMap<String, Topic>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a topic's version and wake every current waiter.
    pub fn signal(&self, topic: &str) {
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        entry.version += 1;
        entry.notify.notify_waiters();
    }

    /// Current version of a topic (0 if never signaled).
    pub fn version(&self, topic: &str) -> u64 {
        self.topics.get(topic).map(|t| t.version).unwrap_or(0)
    }

    /// Wait until the topic's version differs from `known`, or `timeout`
    /// elapses. Returns the version current at resolution time.
    ///
    /// `known == None` waits for the next signal. The waiter is registered
    /// before the version is re-read, so a signal racing this call is never
    /// lost.
    pub async fn wait(&self, topic: &str, known: Option<u64>, timeout: Duration) -> u64 {
        let notify = self
            .topics
            .entry(topic.to_string())
            .or_default()
            .notify
            .clone();

        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(known) = known {
            let current = self.version(topic);
            if current != known {
                return current;
            }
        }

        let _ = tokio::time::timeout(timeout, notified).await;
        self.version(topic)
    }
}

/// Topic for an event's ranking feed.
pub fn event_topic(event_id: u64) -> String {
    format!("event:{}", event_id)
}

/// Topic for a room's status and ranking feed.
pub fn room_topic(room_id: u64) -> String {
    format!("room:{}", room_id)
}
