//! Session identity and history.
//!
//! A session is one continuous period of use. The session in progress is
//! persisted in the durable store with a TTL equal to the session lifetime,
//! and rewritten on every resume and tracked event, so the TTL slides with
//! activity and a restart within that window resumes both the identifier
//! and the event count. Ended sessions are appended to a rolling history
//! capped at a configured length.

mod trend;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, IdGenerator, make_id};
use crate::persistence::{DurableStore, SetOptions};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

pub use trend::{Trend, TrendDirection, linear_trend};

/// Number of ended sessions kept in history.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Lifetime of a persisted session identifier (30 minutes).
pub const DEFAULT_SESSION_TTL_MS: u64 = 30 * 60 * 1_000;

const CURRENT_SESSION_KEY: &str = "session_current";
const HISTORY_KEY: &str = "session_history";

/// Summary written to history when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session identifier.
    pub id: String,
    /// Start time in milliseconds since the Unix epoch.
    pub start: u64,
    /// End time in milliseconds since the Unix epoch.
    pub end: u64,
    /// `end - start` in milliseconds.
    pub duration: u64,
    /// Events tracked during the session.
    pub event_count: u64,
}

/// The session currently in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    /// Session identifier.
    pub id: String,
    /// Start time in milliseconds since the Unix epoch.
    pub start_time: u64,
    /// Events tracked so far.
    #[serde(default)]
    pub event_count: u64,
}

/// Tuning for a [`SessionTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Ended sessions kept in history.
    pub history_limit: usize,
    /// Lifetime of the persisted identifier in milliseconds.
    pub session_ttl_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
        }
    }
}

/// Produces and persists the identifier correlating one visit's events.
pub struct SessionTracker {
    store: Arc<DurableStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    telemetry: Arc<dyn TelemetrySink>,
    settings: SessionSettings,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionTracker {
    /// Creates a tracker; no session exists until one is requested.
    #[must_use]
    pub fn new(
        store: Arc<DurableStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        telemetry: Arc<dyn TelemetrySink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            telemetry,
            settings,
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns the current session identifier, resuming a persisted one or
    /// starting a new session when none exists.
    ///
    /// Repeated calls return the same value until [`Self::end_session`].
    pub fn get_or_create_session_id(&self) -> String {
        let mut active = self.lock();
        if let Some(session) = active.as_ref() {
            return session.id.clone();
        }

        let session = match self
            .store
            .get::<Option<ActiveSession>>(CURRENT_SESSION_KEY, None)
        {
            Some(resumed) => {
                tracing::debug!("resumed session {}", resumed.id);
                self.persist(&resumed);
                resumed
            }
            None => self.start_session(),
        };
        let id = session.id.clone();
        *active = Some(session);
        id
    }

    fn start_session(&self) -> ActiveSession {
        let start_time = self.clock.now_millis();
        let session = ActiveSession {
            id: make_id("session", start_time, &self.ids.suffix()),
            start_time,
            event_count: 0,
        };
        self.persist(&session);
        tracing::debug!("started session {}", session.id);
        session
    }

    /// Writes `session` with a fresh TTL.
    fn persist(&self, session: &ActiveSession) {
        let options = SetOptions::default().with_ttl(self.settings.session_ttl_ms);
        if let Err(error) = self.store.set(CURRENT_SESSION_KEY, session, options) {
            tracing::debug!("session {} kept in memory only: {error}", session.id);
        }
    }

    /// Counts one tracked event against the current session and persists
    /// the new count.
    pub fn record_event(&self) {
        self.get_or_create_session_id();
        let updated = self.lock().as_mut().map(|session| {
            session.event_count = session.event_count.saturating_add(1);
            session.clone()
        });
        if let Some(session) = updated {
            self.persist(&session);
        }
    }

    /// Returns a snapshot of the session in progress.
    #[must_use]
    pub fn current(&self) -> Option<ActiveSession> {
        self.lock().clone()
    }

    /// Ends the session in progress and appends it to history.
    ///
    /// Returns `None` when no session is active.
    pub fn end_session(&self) -> Option<SessionSummary> {
        let session = self.lock().take()?;
        let end = self.clock.now_millis();
        let summary = SessionSummary {
            duration: end.saturating_sub(session.start_time),
            id: session.id,
            start: session.start_time,
            end,
            event_count: session.event_count,
        };

        let mut history = self.history();
        history.push(summary.clone());
        let excess = history.len().saturating_sub(self.settings.history_limit);
        history.drain(..excess);

        if let Err(error) = self.store.set(HISTORY_KEY, &history, SetOptions::default()) {
            tracing::warn!("failed to persist session history: {error}");
        }
        if let Err(error) = self.store.remove(CURRENT_SESSION_KEY) {
            tracing::warn!("failed to clear current session: {error}");
        }

        self.telemetry.record(TelemetryEvent::SessionEnded {
            session_id: summary.id.clone(),
            duration_ms: summary.duration,
            event_count: summary.event_count,
        });
        Some(summary)
    }

    /// Returns ended sessions, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<SessionSummary> {
        self.store.get(HISTORY_KEY, Vec::new())
    }

    /// Fits a trend line over the durations in history.
    #[must_use]
    pub fn duration_trend(&self) -> Option<Trend> {
        let durations: Vec<u64> = self
            .history()
            .iter()
            .map(|summary| summary.duration)
            .collect();
        linear_trend(&durations)
    }
}

#[cfg(test)]
mod tests;
