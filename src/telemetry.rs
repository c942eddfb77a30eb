//! Operational notifications and sinks.
//!
//! Components never call back into host code directly. Instead they emit a
//! [`TelemetryEvent`] into a [`TelemetrySink`] supplied at construction, so
//! the core logic stays independent of whatever surface observes it.

use std::io;

use serde::{Deserialize, Serialize};

/// Where a batch ended up after a successful flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Sent to the configured remote endpoint.
    Endpoint,
    /// Persisted to the durable store.
    Local,
}

/// The bounded resource that ran out of space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuotaScope {
    /// The in-memory event queue.
    EventQueue,
    /// The durable store backing medium.
    Storage {
        /// Logical key whose write was refused.
        key: String,
    },
}

/// A structured notification emitted by the telemetry pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Records the current database schema version after migrations apply.
    SchemaVersionRecorded {
        /// Diesel migration version string (e.g. `20260101000000`).
        schema_version: String,
    },
    /// A logical value was written to the durable store.
    DataUpdated {
        /// Logical key (without namespace prefix).
        key: String,
    },
    /// A bounded resource overflowed and data was refused or dropped.
    QuotaExceeded {
        /// Which resource overflowed.
        scope: QuotaScope,
        /// Number of events dropped (zero for refused storage writes).
        dropped: usize,
    },
    /// Storage usage crossed the warning threshold of a known quota.
    QuotaWarning {
        /// Bytes currently used.
        used_bytes: u64,
        /// Total bytes available.
        quota_bytes: u64,
    },
    /// The preferred storage backend was unavailable.
    StorageFallback {
        /// Backend that ended up active.
        backend: String,
    },
    /// A corrupted stored value was discarded.
    CorruptionDetected {
        /// Logical key that held the value.
        key: String,
        /// Whether a backup copy was restored.
        recovered: bool,
    },
    /// A batch was delivered.
    BatchSent {
        /// Number of events in the batch.
        count: usize,
        /// Destination of the batch.
        method: DeliveryMethod,
    },
    /// A batch could not be delivered and was kept for retry.
    BatchFailed {
        /// Number of events in the batch.
        count: usize,
        /// Failure detail.
        message: String,
    },
    /// Events from the retry queue were delivered.
    RetryReplayed {
        /// Number of events delivered.
        count: usize,
    },
    /// A session ended and was written to history.
    SessionEnded {
        /// Session identifier.
        session_id: String,
        /// Session duration in milliseconds.
        duration_ms: u64,
        /// Events tracked during the session.
        event_count: u64,
    },
    /// The remote endpoint asked the client to obtain user consent.
    ConsentRequested,
    /// Tracking was switched off by a remote directive.
    TrackingDisabled,
    /// Another writer changed a shared storage key.
    ExternalStorageChange {
        /// Physical key reported by the host.
        key: String,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Records telemetry events to stderr as JSON lines (JSONL).
///
/// This is intended for local debugging and is not transmitted anywhere.
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}

/// Sinks used by tests to inspect emitted events.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use std::sync::Mutex;

    use super::{TelemetryEvent, TelemetrySink};

    /// Sink that keeps every event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl RecordingSink {
        /// Drains and returns the recorded events.
        pub fn take(&self) -> Vec<TelemetryEvent> {
            self.events
                .lock()
                .map(|mut events| events.drain(..).collect())
                .unwrap_or_default()
        }

        /// Returns a copy of the recorded events without draining them.
        pub fn snapshot(&self) -> Vec<TelemetryEvent> {
            self.events
                .lock()
                .map(|events| events.clone())
                .unwrap_or_default()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn record(&self, event: TelemetryEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }
}
