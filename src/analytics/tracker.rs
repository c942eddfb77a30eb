//! Facade wiring the pipeline together and reacting to host signals.
//!
//! Host lifecycle events arrive as [`HostSignal`] messages on a bounded
//! channel. [`Tracker::run`] multiplexes them with the adaptive flush timer
//! until the host terminates or the channel closes.

use std::ops::ControlFlow;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::clock::{Clock, IdGenerator};
use crate::persistence::DurableStore;
use crate::session::{SessionSummary, SessionTracker};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

use super::collector::{CollectorDeps, EventCollector, QueueLimits, TrackOutcome};
use super::context::{Connectivity, ContextProvider, HostContext};
use super::flusher::{BatchFlusher, FlushOutcome, FlusherDeps};
use super::retry::{ReplayOutcome, RetryQueue};
use super::settings::{LiveSettings, TrackerSettings};
use super::transport::BatchTransport;

/// Default capacity of the host signal channel.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 64;

/// Lifecycle notifications from the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    /// Connectivity returned.
    Online,
    /// Connectivity was lost.
    Offline,
    /// The host moved to the background.
    VisibilityHidden,
    /// The host returned to the foreground.
    VisibilityVisible,
    /// The host is about to unload.
    BeforeUnload,
    /// The host asked the tracker to stop.
    Terminate,
    /// Another writer changed a shared storage key.
    StorageChanged {
        /// Key reported by the host.
        key: String,
    },
    /// Flush immediately.
    FlushNow,
}

/// Collaborators injected into a [`Tracker`].
pub struct TrackerDeps {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Identifier suffix source.
    pub ids: Arc<dyn IdGenerator>,
    /// Receives operational notifications.
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Remote sink; batches are stored locally when absent.
    pub transport: Option<Arc<dyn BatchTransport>>,
    /// Context provider; defaults to [`HostContext`] over the tracker's
    /// connectivity flag.
    pub context: Option<Arc<dyn ContextProvider>>,
}

/// The assembled telemetry pipeline.
pub struct Tracker {
    session: Arc<SessionTracker>,
    collector: Arc<EventCollector>,
    retry: Arc<RetryQueue>,
    flusher: BatchFlusher,
    live: Arc<LiveSettings>,
    connectivity: Connectivity,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Tracker {
    /// Wires the pipeline over `store` and starts (or resumes) the session.
    #[must_use]
    pub fn new(settings: &TrackerSettings, store: Arc<DurableStore>, deps: TrackerDeps) -> Self {
        let connectivity = Connectivity::new(true);
        let live = Arc::new(LiveSettings::new(settings));
        let session = Arc::new(SessionTracker::new(
            store.clone(),
            deps.clock.clone(),
            deps.ids.clone(),
            deps.telemetry.clone(),
            settings.session,
        ));
        let context: Arc<dyn ContextProvider> = match deps.context {
            Some(context) => context,
            None => Arc::new(HostContext::new(
                settings.language.clone(),
                connectivity.clone(),
            )),
        };
        let collector = Arc::new(EventCollector::new(
            CollectorDeps {
                session: session.clone(),
                context,
                live: live.clone(),
                clock: deps.clock.clone(),
                ids: deps.ids,
                telemetry: deps.telemetry.clone(),
            },
            QueueLimits {
                max_size: settings.max_queue_size,
                trim_size: settings.queue_trim_size,
            },
        ));
        let retry = Arc::new(RetryQueue::open(
            store.clone(),
            settings.max_retry_queue_size,
        ));
        let flusher = BatchFlusher::new(
            FlusherDeps {
                collector: collector.clone(),
                retry: retry.clone(),
                store,
                transport: deps.transport,
                live: live.clone(),
                connectivity: connectivity.clone(),
                clock: deps.clock,
                telemetry: deps.telemetry.clone(),
            },
            settings.max_local_batches,
        );

        let session_id = session.get_or_create_session_id();
        tracing::debug!("tracker started for {session_id}");

        Self {
            session,
            collector,
            retry,
            flusher,
            live,
            connectivity,
            telemetry: deps.telemetry,
        }
    }

    /// Creates a bounded channel for host signals.
    #[must_use]
    pub fn signal_channel(
        capacity: usize,
    ) -> (mpsc::Sender<HostSignal>, mpsc::Receiver<HostSignal>) {
        mpsc::channel(capacity.max(1))
    }

    /// Session tracker.
    #[must_use]
    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    /// Event collector.
    #[must_use]
    pub fn collector(&self) -> &EventCollector {
        &self.collector
    }

    /// Retry queue.
    #[must_use]
    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry
    }

    /// Batch flusher.
    #[must_use]
    pub const fn flusher(&self) -> &BatchFlusher {
        &self.flusher
    }

    /// Runtime-adjustable settings.
    #[must_use]
    pub fn live_settings(&self) -> &LiveSettings {
        &self.live
    }

    /// Host connectivity flag.
    #[must_use]
    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Tracks one event, flushing immediately when requested.
    pub async fn track(&self, name: &str, data: Map<String, Value>, urgent: bool) -> TrackOutcome {
        let outcome = self.collector.track(name, data, urgent);
        if outcome.flush_requested() {
            self.flusher.flush().await;
        }
        outcome
    }

    /// Flushes the queue.
    pub async fn flush(&self) -> FlushOutcome {
        self.flusher.flush().await
    }

    /// Ends the session and flushes what remains.
    pub async fn end_session(&self) -> Option<SessionSummary> {
        let summary = self.session.end_session();
        self.flusher.flush().await;
        summary
    }

    /// Reacts to one host signal.
    ///
    /// Returns [`ControlFlow::Break`] once the host has unloaded or
    /// terminated.
    pub async fn handle(&self, signal: HostSignal) -> ControlFlow<()> {
        tracing::trace!("host signal {signal:?}");
        match signal {
            HostSignal::Online => {
                self.connectivity.set_online(true);
                if let Some(ReplayOutcome::Delivered { count, .. }) =
                    self.flusher.replay_retries().await
                {
                    tracing::debug!("replayed {count} events after reconnecting");
                }
            }
            HostSignal::Offline => self.connectivity.set_online(false),
            HostSignal::VisibilityHidden | HostSignal::FlushNow => {
                self.flusher.flush().await;
            }
            HostSignal::VisibilityVisible => {
                self.session.get_or_create_session_id();
            }
            HostSignal::StorageChanged { key } => {
                tracing::debug!("storage key '{key}' changed elsewhere");
                self.telemetry
                    .record(TelemetryEvent::ExternalStorageChange { key });
            }
            HostSignal::BeforeUnload | HostSignal::Terminate => {
                self.end_session().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Runs the flush timer and signal loop until the host stops.
    ///
    /// The timer is only rearmed after it fires, so host signals never
    /// postpone a periodic flush. The interval adapts to the queue length
    /// seen at each tick. A closed channel is treated like
    /// [`HostSignal::Terminate`].
    pub async fn run(&self, mut signals: mpsc::Receiver<HostSignal>) {
        let first = self.live.next_flush_interval(self.collector.len());
        let timer = tokio::time::sleep(first);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                () = &mut timer => {
                    let pending = self.collector.len();
                    self.flusher.flush().await;
                    let next = self.live.next_flush_interval(pending);
                    timer.as_mut().reset(tokio::time::Instant::now() + next);
                }
                received = signals.recv() => {
                    let signal = received.unwrap_or(HostSignal::Terminate);
                    if self.handle(signal).await.is_break() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
