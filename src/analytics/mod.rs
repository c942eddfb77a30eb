//! Event collection, batching, and delivery.
//!
//! Events enter through the [`EventCollector`], which validates names,
//! redacts sensitive payload fields, attaches context, and queues them. The
//! [`BatchFlusher`] drains the queue to a remote endpoint when one is
//! configured and to the durable store otherwise. Failed deliveries go back
//! to the live queue and into the [`RetryQueue`] for replay once the host is
//! online again. [`Tracker`] wires these together and drives them from host
//! signals.

mod collector;
mod context;
mod event;
mod flusher;
mod retry;
mod sanitize;
mod schedule;
mod settings;
mod tracker;
mod transport;

#[cfg(test)]
mod test_helpers;

pub use collector::{
    CONTEXT_KEY, CollectorDeps, EventCollector, QueueLimits, RejectReason, TrackOutcome,
};
pub use context::{
    Connectivity, ContextProvider, EnvironmentContext, HostContext, MemoryPressure,
    language_from_locale,
};
pub use event::{Event, EventName, EventNameError, MAX_EVENT_NAME_LEN};
pub use flusher::{BatchFlusher, FlushOutcome, FlusherDeps, LOCAL_BATCHES_KEY, StoredBatch};
pub use retry::{RETRY_QUEUE_KEY, ReplayOutcome, RetryQueue};
pub use sanitize::{
    HOUR_MS, REDACTION_MARKER, floor_to_hour, is_denylisted, sanitize_map, sanitize_value,
};
pub use schedule::FlushSchedule;
pub use settings::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_LANGUAGE, DEFAULT_MAX_FLUSH_INTERVAL,
    DEFAULT_MAX_LOCAL_BATCHES, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_RETRY_QUEUE_SIZE,
    DEFAULT_MIN_FLUSH_INTERVAL, DEFAULT_QUEUE_TRIM_SIZE, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_TRANSPORT_COMPRESSION_THRESHOLD, Instructions, LiveSettings, REMOTE_CONFIG_KEYS,
    TrackerSettings,
};
pub use tracker::{DEFAULT_SIGNAL_CAPACITY, HostSignal, Tracker, TrackerDeps};
pub use transport::{
    BatchTransport, HttpTransport, HttpTransportConfig, OutgoingBatch, PAYLOAD_VERSION,
    SESSION_HEADER, TransportError, TransportResponse,
};
