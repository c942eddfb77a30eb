//! Tracker settings and the runtime-adjustable subset.
//!
//! [`TrackerSettings`] is fixed at construction. [`LiveSettings`] holds the
//! values the remote endpoint may adjust through soft directives; only the
//! allow-listed keys in [`REMOTE_CONFIG_KEYS`] are ever applied.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::session::SessionSettings;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

use super::schedule::FlushSchedule;

/// Events per batch that trigger an early flush.
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Starting flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
/// Shortest adaptive flush interval.
pub const DEFAULT_MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Longest adaptive flush interval.
pub const DEFAULT_MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(300);
/// Queue length above which old events are dropped.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1_000;
/// Queue length kept after dropping old events.
pub const DEFAULT_QUEUE_TRIM_SIZE: usize = 500;
/// Events held for replay after failed transmissions.
pub const DEFAULT_MAX_RETRY_QUEUE_SIZE: usize = 500;
/// Locally persisted batches kept when no endpoint is configured.
pub const DEFAULT_MAX_LOCAL_BATCHES: usize = 100;
/// Request body size above which batches are compressed.
pub const DEFAULT_TRANSPORT_COMPRESSION_THRESHOLD: usize = 1_024;
/// Upper bound on one transmission.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Language reported when the host offers none.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Configuration keys a remote endpoint may change.
pub const REMOTE_CONFIG_KEYS: [&str; 4] = ["batchSize", "flushInterval", "privacyMode", "debug"];

/// Everything a [`super::Tracker`] needs to know at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Remote endpoint; batches are stored locally when absent.
    pub endpoint: Option<Url>,
    /// Bearer token sent with each transmission.
    pub auth_token: Option<String>,
    /// Queue length that requests a flush.
    pub batch_size: usize,
    /// Starting flush interval.
    pub flush_interval: Duration,
    /// Lower bound of the adaptive interval.
    pub min_flush_interval: Duration,
    /// Upper bound of the adaptive interval.
    pub max_flush_interval: Duration,
    /// Queue length above which the oldest events are dropped.
    pub max_queue_size: usize,
    /// Queue length retained after dropping.
    pub queue_trim_size: usize,
    /// Retry queue bound.
    pub max_retry_queue_size: usize,
    /// Local batch history bound.
    pub max_local_batches: usize,
    /// Request body size above which batches are zstd compressed.
    pub compression_threshold: usize,
    /// Upper bound on one transmission.
    pub request_timeout: Duration,
    /// Floors event timestamps to the hour when set.
    pub privacy_mode: bool,
    /// Logs dropped events at warning level when set.
    pub debug: bool,
    /// Language tag reported in event context.
    pub language: String,
    /// Session lifetime and history settings.
    pub session: SessionSettings,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            min_flush_interval: DEFAULT_MIN_FLUSH_INTERVAL,
            max_flush_interval: DEFAULT_MAX_FLUSH_INTERVAL,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            queue_trim_size: DEFAULT_QUEUE_TRIM_SIZE,
            max_retry_queue_size: DEFAULT_MAX_RETRY_QUEUE_SIZE,
            max_local_batches: DEFAULT_MAX_LOCAL_BATCHES,
            compression_threshold: DEFAULT_TRANSPORT_COMPRESSION_THRESHOLD,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            privacy_mode: false,
            debug: false,
            language: DEFAULT_LANGUAGE.to_owned(),
            session: SessionSettings::default(),
        }
    }
}

impl TrackerSettings {
    /// Builds the adaptive schedule described by these settings.
    ///
    /// The high-water mark is the batch size and the low-water mark a
    /// quarter of it.
    #[must_use]
    pub fn schedule(&self) -> FlushSchedule {
        FlushSchedule::new(
            self.flush_interval,
            self.min_flush_interval,
            self.max_flush_interval,
            self.batch_size,
            self.batch_size >> 2,
        )
    }
}

/// Soft directives returned by the remote endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructions {
    /// Proposed configuration changes; non-allow-listed keys are ignored.
    #[serde(default)]
    pub update_config: Option<Map<String, Value>>,
    /// Switches tracking off for the rest of the process.
    #[serde(default)]
    pub disable_tracking: bool,
    /// Asks the host to obtain user consent.
    #[serde(default)]
    pub request_consent: bool,
}

#[derive(Debug, Clone, Copy)]
struct LiveState {
    batch_size: usize,
    privacy_mode: bool,
    debug: bool,
    enabled: bool,
    consent_requested: bool,
    schedule: FlushSchedule,
}

/// Settings that may change while the tracker runs.
#[derive(Debug)]
pub struct LiveSettings {
    state: Mutex<LiveState>,
}

impl LiveSettings {
    /// Captures the adjustable subset of `settings`.
    #[must_use]
    pub fn new(settings: &TrackerSettings) -> Self {
        Self {
            state: Mutex::new(LiveState {
                batch_size: settings.batch_size.max(1),
                privacy_mode: settings.privacy_mode,
                debug: settings.debug,
                enabled: true,
                consent_requested: false,
                schedule: settings.schedule(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue length that requests a flush.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.lock().batch_size
    }

    /// Whether timestamps are floored to the hour.
    #[must_use]
    pub fn privacy_mode(&self) -> bool {
        self.lock().privacy_mode
    }

    /// Whether dropped events are logged loudly.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.lock().debug
    }

    /// Whether new events are accepted.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Whether the endpoint has asked for consent.
    #[must_use]
    pub fn consent_requested(&self) -> bool {
        self.lock().consent_requested
    }

    /// Current flush interval.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        self.lock().schedule.interval()
    }

    /// Adapts the flush interval to `queue_len` and returns it.
    pub fn next_flush_interval(&self, queue_len: usize) -> Duration {
        self.lock().schedule.adapt(queue_len)
    }

    /// Applies remote directives and returns the configuration keys that
    /// changed.
    pub fn apply(&self, instructions: &Instructions, telemetry: &dyn TelemetrySink) -> Vec<String> {
        let mut applied = Vec::new();
        if let Some(update) = &instructions.update_config {
            let mut state = self.lock();
            for (key, value) in update {
                if apply_config_value(&mut state, key, value) {
                    applied.push(key.clone());
                } else {
                    tracing::debug!("ignoring remote config key '{key}'");
                }
            }
        }

        if instructions.disable_tracking {
            self.lock().enabled = false;
            tracing::warn!("tracking disabled by remote directive");
            telemetry.record(TelemetryEvent::TrackingDisabled);
        }
        if instructions.request_consent {
            self.lock().consent_requested = true;
            telemetry.record(TelemetryEvent::ConsentRequested);
        }
        applied
    }
}

fn apply_config_value(state: &mut LiveState, key: &str, value: &Value) -> bool {
    match (key, value) {
        ("batchSize", Value::Number(number)) => {
            match number.as_u64().and_then(|size| usize::try_from(size).ok()) {
                Some(size) if size > 0 => {
                    state.batch_size = size;
                    true
                }
                _ => false,
            }
        }
        ("flushInterval", Value::Number(number)) => number.as_u64().is_some_and(|millis| {
            state.schedule.reset(Duration::from_millis(millis));
            true
        }),
        ("privacyMode", Value::Bool(flag)) => {
            state.privacy_mode = *flag;
            true
        }
        ("debug", Value::Bool(flag)) => {
            state.debug = *flag;
            true
        }
        _ => false,
    }
}
