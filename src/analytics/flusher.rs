//! Draining the event queue to the endpoint or the durable store.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::persistence::{DurableStore, SetOptions};
use crate::telemetry::{DeliveryMethod, TelemetryEvent, TelemetrySink};

use super::collector::EventCollector;
use super::context::Connectivity;
use super::event::Event;
use super::retry::{ReplayOutcome, RetryQueue};
use super::settings::LiveSettings;
use super::transport::{BatchTransport, OutgoingBatch, TransportResponse};

/// Durable store key holding locally persisted batches.
pub const LOCAL_BATCHES_KEY: &str = "analytics_batches";

/// A batch persisted locally because no endpoint is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBatch {
    /// Flush time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Session of the first event in the batch.
    pub session_id: String,
    /// Events in insertion order.
    pub events: Vec<Event>,
}

/// Result of one flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The queue was empty.
    Empty,
    /// The batch was delivered.
    Sent {
        /// Number of events delivered.
        count: usize,
        /// Where the batch went.
        method: DeliveryMethod,
    },
    /// Delivery failed; the batch was re-queued and copied for retry.
    Failed {
        /// Number of events re-queued.
        count: usize,
    },
}

/// Dependencies of a [`BatchFlusher`].
pub struct FlusherDeps {
    /// Queue to drain.
    pub collector: Arc<EventCollector>,
    /// Holds batches whose delivery failed.
    pub retry: Arc<RetryQueue>,
    /// Local sink used when no transport is configured.
    pub store: Arc<DurableStore>,
    /// Remote sink, when an endpoint is configured.
    pub transport: Option<Arc<dyn BatchTransport>>,
    /// Receives remote directives.
    pub live: Arc<LiveSettings>,
    /// Host connectivity flag.
    pub connectivity: Connectivity,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Receives delivery notifications.
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Drains the collector's queue, one flush at a time.
pub struct BatchFlusher {
    deps: FlusherDeps,
    max_local_batches: usize,
    flush_lock: tokio::sync::Mutex<()>,
}

impl BatchFlusher {
    /// Creates a flusher keeping at most `max_local_batches` local batches.
    #[must_use]
    pub fn new(deps: FlusherDeps, max_local_batches: usize) -> Self {
        Self {
            deps,
            max_local_batches,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns true when batches go to a remote endpoint.
    #[must_use]
    pub fn has_endpoint(&self) -> bool {
        self.deps.transport.is_some()
    }

    /// Swaps the queue out and delivers it.
    ///
    /// Flushes are serialised. Events tracked while a flush is in flight
    /// stay in the live queue for the next one. Failures never propagate;
    /// the batch is put back at the front of the queue and copied into the
    /// retry queue.
    pub async fn flush(&self) -> FlushOutcome {
        let _guard = self.flush_lock.lock().await;
        let batch = self.deps.collector.take_all();
        let Some(session_id) = batch.first().map(|event| event.session_id.clone()) else {
            return FlushOutcome::Empty;
        };
        let count = batch.len();

        let delivered = match &self.deps.transport {
            Some(transport) => self.send_remote(transport.as_ref(), session_id, &batch).await,
            None => self.store_local(session_id, &batch),
        };

        match delivered {
            Ok(method) => {
                let ids: HashSet<String> =
                    batch.iter().map(|event| event.event_id.clone()).collect();
                self.deps.retry.forget(&ids);
                self.deps
                    .telemetry
                    .record(TelemetryEvent::BatchSent { count, method });
                tracing::debug!("flushed {count} events ({method:?})");
                FlushOutcome::Sent { count, method }
            }
            Err(message) => {
                tracing::warn!("flush of {count} events failed: {message}");
                self.deps.retry.enqueue(&batch);
                self.deps.collector.prepend(batch);
                self.deps
                    .telemetry
                    .record(TelemetryEvent::BatchFailed { count, message });
                FlushOutcome::Failed { count }
            }
        }
    }

    async fn send_remote(
        &self,
        transport: &dyn BatchTransport,
        session_id: String,
        batch: &[Event],
    ) -> Result<DeliveryMethod, String> {
        if !self.deps.connectivity.is_online() {
            return Err("host is offline".to_owned());
        }
        let outgoing = OutgoingBatch {
            session_id,
            timestamp: self.deps.clock.now_millis(),
            events: batch.to_vec(),
        };
        let response = transport
            .send(&outgoing)
            .await
            .map_err(|error| error.to_string())?;
        self.apply_response(&response);
        Ok(DeliveryMethod::Endpoint)
    }

    fn store_local(&self, session_id: String, batch: &[Event]) -> Result<DeliveryMethod, String> {
        let mut batches: Vec<StoredBatch> = self.deps.store.get(LOCAL_BATCHES_KEY, Vec::new());
        batches.push(StoredBatch {
            timestamp: self.deps.clock.now_millis(),
            session_id,
            events: batch.to_vec(),
        });
        let excess = batches.len().saturating_sub(self.max_local_batches);
        batches.drain(..excess);

        self.deps
            .store
            .set(LOCAL_BATCHES_KEY, &batches, SetOptions::default())
            .map_err(|error| error.to_string())?;
        Ok(DeliveryMethod::Local)
    }

    fn apply_response(&self, response: &TransportResponse) {
        if let Some(instructions) = &response.instructions {
            let applied = self
                .deps
                .live
                .apply(instructions, self.deps.telemetry.as_ref());
            if !applied.is_empty() {
                tracing::debug!("applied remote config: {}", applied.join(", "));
            }
        }
    }

    /// Replays the retry queue when online and an endpoint is configured.
    ///
    /// Returns `None` when replay was not attempted.
    pub async fn replay_retries(&self) -> Option<ReplayOutcome> {
        let transport = self.deps.transport.as_ref()?;
        if !self.deps.connectivity.is_online() || self.deps.retry.is_empty() {
            return None;
        }

        let _guard = self.flush_lock.lock().await;
        let live_ids = self.deps.collector.queued_ids();
        let outcome = self
            .deps
            .retry
            .replay(transport.as_ref(), &live_ids, self.deps.clock.now_millis())
            .await;
        match &outcome {
            ReplayOutcome::Delivered { count, response } => {
                self.apply_response(response);
                self.deps
                    .telemetry
                    .record(TelemetryEvent::RetryReplayed { count: *count });
            }
            ReplayOutcome::Failed { count, error } => {
                tracing::warn!("replay of {count} events failed: {error}");
            }
            ReplayOutcome::Empty => {}
        }
        Some(outcome)
    }

    /// Returns the locally persisted batches, oldest first.
    #[must_use]
    pub fn local_batches(&self) -> Vec<StoredBatch> {
        self.deps.store.get(LOCAL_BATCHES_KEY, Vec::new())
    }
}

#[cfg(test)]
#[path = "flusher_tests.rs"]
mod tests;
