//! Bounded, persisted queue of events awaiting redelivery.
//!
//! Events land here when a transmission fails. The queue survives restarts
//! through the durable store and is replayed when connectivity returns.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::persistence::{DurableStore, SetOptions};

use super::event::Event;
use super::transport::{BatchTransport, OutgoingBatch, TransportError, TransportResponse};

/// Durable store key holding the retry queue.
pub const RETRY_QUEUE_KEY: &str = "analytics_retry_queue";

/// Result of [`RetryQueue::replay`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// Nothing was left to send once live duplicates were skipped.
    Empty,
    /// The replayed events were delivered.
    Delivered {
        /// Number of events delivered.
        count: usize,
        /// Endpoint response.
        response: TransportResponse,
    },
    /// Delivery failed and the events were re-queued.
    Failed {
        /// Number of events re-queued.
        count: usize,
        /// Failure detail.
        error: TransportError,
    },
}

/// Events that failed transmission at least once.
pub struct RetryQueue {
    store: Arc<DurableStore>,
    max_size: usize,
    entries: Mutex<VecDeque<Event>>,
}

impl RetryQueue {
    /// Opens the queue, restoring any persisted entries.
    #[must_use]
    pub fn open(store: Arc<DurableStore>, max_size: usize) -> Self {
        let mut entries: VecDeque<Event> = store.get::<Vec<Event>>(RETRY_QUEUE_KEY, Vec::new()).into();
        truncate_oldest(&mut entries, max_size);
        Self {
            store,
            max_size,
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, entries: &VecDeque<Event>) {
        let snapshot: Vec<&Event> = entries.iter().collect();
        if let Err(error) = self.store.set(RETRY_QUEUE_KEY, &snapshot, SetOptions::default()) {
            tracing::warn!("retry queue kept in memory only: {error}");
        }
    }

    /// Appends events not already queued, truncating the oldest beyond the
    /// bound. Returns how many old entries were truncated.
    pub fn enqueue(&self, events: &[Event]) -> usize {
        let mut entries = self.lock();
        let known: HashSet<String> = entries.iter().map(|event| event.event_id.clone()).collect();
        entries.extend(
            events
                .iter()
                .filter(|event| !known.contains(&event.event_id))
                .cloned(),
        );
        let truncated = truncate_oldest(&mut entries, self.max_size);
        self.persist(&entries);
        truncated
    }

    /// Drops entries whose identifiers are in `delivered`.
    pub fn forget(&self, delivered: &HashSet<String>) {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|event| !delivered.contains(&event.event_id));
        if entries.len() != before {
            self.persist(&entries);
        }
    }

    /// Replays queued events through `transport`.
    ///
    /// Entries whose identifiers are in `live_ids` are dropped without being
    /// sent, since the live queue will deliver them. On failure the
    /// remaining events go back to the front of the queue, within the bound.
    pub async fn replay(
        &self,
        transport: &dyn BatchTransport,
        live_ids: &HashSet<String>,
        timestamp: u64,
    ) -> ReplayOutcome {
        let pending: Vec<Event> = {
            let mut entries = self.lock();
            let drained: Vec<Event> = entries.drain(..).collect();
            self.persist(&entries);
            drained
        };
        let events: Vec<Event> = pending
            .into_iter()
            .filter(|event| !live_ids.contains(&event.event_id))
            .collect();
        let Some(session_id) = events.first().map(|event| event.session_id.clone()) else {
            return ReplayOutcome::Empty;
        };

        let batch = OutgoingBatch {
            session_id,
            timestamp,
            events,
        };
        match transport.send(&batch).await {
            Ok(response) => ReplayOutcome::Delivered {
                count: batch.events.len(),
                response,
            },
            Err(error) => {
                let count = batch.events.len();
                self.requeue(batch.events);
                ReplayOutcome::Failed { count, error }
            }
        }
    }

    fn requeue(&self, events: Vec<Event>) {
        let mut entries = self.lock();
        let known: HashSet<String> = entries.iter().map(|event| event.event_id.clone()).collect();
        for event in events.into_iter().rev() {
            if !known.contains(&event.event_id) {
                entries.push_front(event);
            }
        }
        truncate_oldest(&mut entries, self.max_size);
        self.persist(&entries);
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing awaits redelivery.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the queue without draining it.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }
}

fn truncate_oldest(entries: &mut VecDeque<Event>, max_size: usize) -> usize {
    let excess = entries.len().saturating_sub(max_size);
    entries.drain(..excess);
    excess
}
