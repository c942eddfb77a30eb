//! Event validation, enrichment, and the bounded in-memory queue.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::clock::{Clock, IdGenerator, make_id};
use crate::session::SessionTracker;
use crate::telemetry::{QuotaScope, TelemetryEvent, TelemetrySink};

use super::context::ContextProvider;
use super::event::{Event, EventName, EventNameError};
use super::sanitize::{floor_to_hour, sanitize_map};
use super::settings::LiveSettings;

/// Key under which environment context is inserted into event payloads.
pub const CONTEXT_KEY: &str = "context";

/// Why an event was not queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Tracking has been disabled.
    Disabled,
    /// The event name failed validation.
    InvalidName(EventNameError),
}

/// Result of [`EventCollector::track`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The event was queued.
    Queued {
        /// True when the caller should flush now.
        flush_requested: bool,
    },
    /// The event was dropped.
    Rejected(RejectReason),
}

impl TrackOutcome {
    /// Returns true when the event was queued and a flush was requested.
    #[must_use]
    pub const fn flush_requested(&self) -> bool {
        matches!(
            self,
            Self::Queued {
                flush_requested: true
            }
        )
    }
}

/// Queue length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Length above which the oldest events are dropped.
    pub max_size: usize,
    /// Length retained after dropping.
    pub trim_size: usize,
}

/// Dependencies shared by the collector.
pub struct CollectorDeps {
    /// Source of session identifiers.
    pub session: Arc<SessionTracker>,
    /// Source of environment context.
    pub context: Arc<dyn ContextProvider>,
    /// Runtime-adjustable settings.
    pub live: Arc<LiveSettings>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Identifier suffix source.
    pub ids: Arc<dyn IdGenerator>,
    /// Receives queue overflow notifications.
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Accepts events and holds them until the flusher drains the queue.
pub struct EventCollector {
    deps: CollectorDeps,
    limits: QueueLimits,
    queue: Mutex<VecDeque<Event>>,
}

impl EventCollector {
    /// Creates an empty collector.
    ///
    /// A trim size larger than the maximum is lowered to the maximum.
    #[must_use]
    pub fn new(deps: CollectorDeps, limits: QueueLimits) -> Self {
        Self {
            deps,
            limits: QueueLimits {
                max_size: limits.max_size,
                trim_size: limits.trim_size.min(limits.max_size),
            },
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Validates, enriches, sanitises, and queues one event.
    ///
    /// Invalid names and disabled tracking drop the event and report why;
    /// nothing here fails the caller.
    pub fn track(&self, name: &str, data: Map<String, Value>, urgent: bool) -> TrackOutcome {
        let live = &self.deps.live;
        if !live.enabled() {
            return TrackOutcome::Rejected(RejectReason::Disabled);
        }
        let event_name = match EventName::parse(name) {
            Ok(event_name) => event_name,
            Err(error) => {
                if live.debug() {
                    tracing::warn!("dropping event {name:?}: {error}");
                } else {
                    tracing::trace!("dropping event {name:?}: {error}");
                }
                return TrackOutcome::Rejected(RejectReason::InvalidName(error));
            }
        };

        let event = self.build_event(event_name, data);
        self.deps.session.record_event();

        let length = self.push(event);
        TrackOutcome::Queued {
            flush_requested: urgent || length >= live.batch_size(),
        }
    }

    fn build_event(&self, name: EventName, mut data: Map<String, Value>) -> Event {
        let session_id = self.deps.session.get_or_create_session_id();
        sanitize_map(&mut data);
        match serde_json::to_value(self.deps.context.snapshot()) {
            Ok(context) => {
                data.insert(CONTEXT_KEY.to_owned(), context);
            }
            Err(error) => tracing::debug!("event context unavailable: {error}"),
        }

        let now = self.deps.clock.now_millis();
        let timestamp = if self.deps.live.privacy_mode() {
            floor_to_hour(now)
        } else {
            now
        };

        Event {
            event_id: make_id("evt", now, &self.deps.ids.suffix()),
            name,
            data,
            timestamp,
            session_id,
        }
    }

    fn push(&self, event: Event) -> usize {
        let (length, dropped) = {
            let mut queue = self.lock();
            queue.push_back(event);
            let dropped = enforce_bound(&mut queue, self.limits);
            (queue.len(), dropped)
        };
        self.report_overflow(dropped);
        length
    }

    fn report_overflow(&self, dropped: usize) {
        if dropped == 0 {
            return;
        }
        tracing::warn!("event queue overflowed; dropped {dropped} oldest events");
        self.deps.telemetry.record(TelemetryEvent::QuotaExceeded {
            scope: QuotaScope::EventQueue,
            dropped,
        });
    }

    /// Removes and returns every queued event in insertion order.
    ///
    /// Events tracked after this returns land in a fresh queue.
    pub fn take_all(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock()).into()
    }

    /// Puts `batch` back at the front of the queue, ahead of newer events.
    pub fn prepend(&self, batch: Vec<Event>) {
        let dropped = {
            let mut queue = self.lock();
            for event in batch.into_iter().rev() {
                queue.push_front(event);
            }
            enforce_bound(&mut queue, self.limits)
        };
        self.report_overflow(dropped);
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Identifiers of every queued event.
    #[must_use]
    pub fn queued_ids(&self) -> HashSet<String> {
        self.lock()
            .iter()
            .map(|event| event.event_id.clone())
            .collect()
    }

    /// Copies the queue without draining it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }
}

fn enforce_bound(queue: &mut VecDeque<Event>, limits: QueueLimits) -> usize {
    if queue.len() <= limits.max_size {
        return 0;
    }
    let dropped = queue.len().saturating_sub(limits.trim_size);
    queue.drain(..dropped);
    dropped
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod tests;
