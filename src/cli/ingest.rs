//! Tracks JSON-lines events read from stdin.
//!
//! Each non-blank line is an object `{"name": ..., "data": {...},
//! "urgent": false}`; `data` and `urgent` are optional. The tracker's signal
//! loop runs while lines are read, so the adaptive flush timer fires as it
//! would in a long-lived host. End of input terminates the session, which
//! performs the final flush.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use simtrack::analytics::{DEFAULT_SIGNAL_CAPACITY, HttpTransport, HttpTransportConfig};
use simtrack::clock::{Clock, RandomIdGenerator, SystemClock};
use simtrack::telemetry::{NoopTelemetrySink, StderrJsonlTelemetrySink, TelemetrySink};
use simtrack::{
    BatchTransport, HostSignal, SessionSummary, SimtrackConfig, SimtrackError, TrackOutcome,
    Tracker, TrackerDeps, TrackerSettings,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::output::{io_error, write_ingest_summary};
use super::wiring::open_store;

/// One input line.
#[derive(Debug, Deserialize)]
struct IngestLine {
    name: String,
    #[serde(default)]
    data: Map<String, Value>,
    #[serde(default)]
    urgent: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct LineCounts {
    accepted: usize,
    rejected: usize,
}

/// What happened to the ingested events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    /// Events queued by the collector.
    pub accepted: usize,
    /// Events dropped by validation or because tracking was disabled.
    pub rejected: usize,
    /// The session that was ended, if history retains it.
    pub session: Option<SessionSummary>,
    /// Events waiting in the retry queue.
    pub pending_retries: usize,
    /// Batches held in local storage.
    pub stored_batches: usize,
    /// Events still in the live queue after the final flush.
    pub queued: usize,
}

/// Builds the HTTP transport when an endpoint is configured.
///
/// # Errors
///
/// Returns [`SimtrackError::Configuration`] when the HTTP client cannot be
/// built.
pub fn build_transport(
    settings: &TrackerSettings,
) -> Result<Option<Arc<dyn BatchTransport>>, SimtrackError> {
    let Some(transport_config) = HttpTransportConfig::from_settings(settings) else {
        return Ok(None);
    };
    let transport =
        HttpTransport::new(transport_config).map_err(|error| SimtrackError::Configuration {
            message: error.to_string(),
        })?;
    Ok(Some(Arc::new(transport)))
}

/// Reads events from stdin, delivers them, and prints a summary.
///
/// # Errors
///
/// Returns [`SimtrackError`] when configuration is invalid, stdin cannot be
/// read, a line is not a JSON event, or the summary cannot be written.
pub async fn run(config: &SimtrackConfig) -> Result<(), SimtrackError> {
    let settings = config.tracker_settings()?;
    let telemetry: Arc<dyn TelemetrySink> = if config.debug {
        Arc::new(StderrJsonlTelemetrySink)
    } else {
        Arc::new(NoopTelemetrySink)
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, clock.clone(), telemetry.clone())?;
    let tracker = Tracker::new(
        &settings,
        store,
        TrackerDeps {
            clock,
            ids: Arc::new(RandomIdGenerator),
            telemetry,
            transport: build_transport(&settings)?,
            context: None,
        },
    );

    let summary = ingest(&tracker, BufReader::new(tokio::io::stdin())).await?;
    write_ingest_summary(&summary)
}

/// Feeds every line of `reader` to `tracker` and terminates the session.
///
/// The session is ended and flushed even when a line is rejected as
/// malformed; the error is returned afterwards.
///
/// # Errors
///
/// Returns [`SimtrackError::InvalidInput`] for a line that is not a JSON
/// event and [`SimtrackError::Io`] when reading fails.
pub async fn ingest<R>(tracker: &Tracker, reader: R) -> Result<IngestSummary, SimtrackError>
where
    R: AsyncBufRead + Unpin,
{
    let (sender, receiver) = Tracker::signal_channel(DEFAULT_SIGNAL_CAPACITY);
    let feed = async move {
        let result = feed_lines(tracker, reader).await;
        if sender.send(HostSignal::Terminate).await.is_err() {
            tracing::warn!("tracker loop stopped before the final flush");
        }
        result
    };
    let ((), fed) = tokio::join!(tracker.run(receiver), feed);
    let counts = fed?;

    Ok(IngestSummary {
        accepted: counts.accepted,
        rejected: counts.rejected,
        session: tracker.session().history().pop(),
        pending_retries: tracker.retry_queue().len(),
        stored_batches: tracker.flusher().local_batches().len(),
        queued: tracker.collector().len(),
    })
}

async fn feed_lines<R>(tracker: &Tracker, reader: R) -> Result<LineCounts, SimtrackError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut counts = LineCounts::default();
    let mut line_number = 0_usize;

    while let Some(line) = lines.next_line().await.map_err(|error| io_error(&error))? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: IngestLine =
            serde_json::from_str(&line).map_err(|error| SimtrackError::InvalidInput {
                line: line_number,
                message: error.to_string(),
            })?;
        match tracker.track(&parsed.name, parsed.data, parsed.urgent).await {
            TrackOutcome::Queued { .. } => counts.accepted += 1,
            TrackOutcome::Rejected(reason) => {
                tracing::warn!("line {line_number}: event '{}' dropped: {reason:?}", parsed.name);
                counts.rejected += 1;
            }
        }
    }
    Ok(counts)
}
