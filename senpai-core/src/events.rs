//! Per-session operational event log
//!
//! Fire-and-forget side channel for playback events. Every event is forwarded
//! to `tracing` with its JSON context and kept in a bounded ring for
//! inspection. The log also owns the session's idempotency keys, so "log once
//! per session" messages need no process-global flags.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub level: EventLevel,
    pub message: String,
    pub context: serde_json::Value,
    /// Milliseconds since the Unix epoch
    pub at_ms: u64,
}

struct EventLogInner {
    session: String,
    capacity: usize,
    recent: Mutex<VecDeque<Event>>,
    seen: Mutex<HashSet<String>>,
}

/// Cheap to clone; clones share the ring and the idempotency keys.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

impl EventLog {
    #[must_use]
    pub fn new(session: impl Into<String>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                session: session.into(),
                capacity: capacity.max(1),
                recent: Mutex::new(VecDeque::with_capacity(capacity.clamp(1, 1024))),
                seen: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Record an event. Never blocks on I/O and never fails.
    pub fn log(&self, level: EventLevel, message: impl Into<String>, context: serde_json::Value) {
        let message = message.into();
        let session = self.inner.session.as_str();

        match level {
            EventLevel::Debug => tracing::debug!(session, context = %context, "{message}"),
            EventLevel::Info => tracing::info!(session, context = %context, "{message}"),
            EventLevel::Warn => tracing::warn!(session, context = %context, "{message}"),
            EventLevel::Error => tracing::error!(session, context = %context, "{message}"),
        }

        let at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        let mut recent = self.inner.recent.lock();
        if recent.len() >= self.inner.capacity {
            recent.pop_front();
        }
        recent.push_back(Event {
            level,
            message,
            context,
            at_ms,
        });
    }

    /// Record an event only the first time `key` is seen in this session.
    /// Returns whether the event was emitted.
    pub fn log_once(
        &self,
        key: &str,
        level: EventLevel,
        message: impl Into<String>,
        context: serde_json::Value,
    ) -> bool {
        if !self.inner.seen.lock().insert(key.to_string()) {
            return false;
        }
        self.log(level, message, context);
        true
    }

    pub fn info(&self, message: impl Into<String>, context: serde_json::Value) {
        self.log(EventLevel::Info, message, context);
    }

    pub fn warn(&self, message: impl Into<String>, context: serde_json::Value) {
        self.log(EventLevel::Warn, message, context);
    }

    /// Oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<Event> {
        self.inner.recent.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn session(&self) -> &str {
        &self.inner.session
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("session", &self.inner.session)
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}
