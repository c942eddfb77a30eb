//! Output formatting utilities for CLI operations.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde_json::Value;
use simtrack::SessionSummary;
use simtrack::SimtrackError;
use simtrack::session::{Trend, TrendDirection};

use super::ingest::IngestSummary;

/// Writes the ingest summary to stdout.
pub fn write_ingest_summary(summary: &IngestSummary) -> Result<(), SimtrackError> {
    let mut stdout = io::stdout().lock();
    write_ingest_summary_to(&mut stdout, summary)
}

/// Writes the ingest summary to the given writer.
pub fn write_ingest_summary_to<W: Write>(
    writer: &mut W,
    summary: &IngestSummary,
) -> Result<(), SimtrackError> {
    writeln!(
        writer,
        "Tracked {} events ({} rejected)",
        summary.accepted, summary.rejected
    )
    .map_err(|e| io_error(&e))?;

    if let Some(session) = &summary.session {
        writeln!(
            writer,
            "Session {}: {} events over {} ms",
            session.id, session.event_count, session.duration
        )
        .map_err(|e| io_error(&e))?;
    }

    writeln!(
        writer,
        "Stored batches: {}, pending retries: {}, still queued: {}",
        summary.stored_batches, summary.pending_retries, summary.queued
    )
    .map_err(|e| io_error(&e))
}

/// Writes session history and the duration trend to stdout.
pub fn write_session_report(
    history: &[SessionSummary],
    trend: Option<Trend>,
) -> Result<(), SimtrackError> {
    let mut stdout = io::stdout().lock();
    write_session_report_to(&mut stdout, history, trend)
}

/// Writes session history and the duration trend to the given writer.
pub fn write_session_report_to<W: Write>(
    writer: &mut W,
    history: &[SessionSummary],
    trend: Option<Trend>,
) -> Result<(), SimtrackError> {
    if history.is_empty() {
        return writeln!(writer, "No sessions recorded.").map_err(|e| io_error(&e));
    }

    writeln!(writer, "Sessions ({}):", history.len()).map_err(|e| io_error(&e))?;
    for session in history {
        writeln!(
            writer,
            "  {} started {} [{} events, {} ms]",
            session.id,
            format_start(session.start),
            session.event_count,
            session.duration
        )
        .map_err(|e| io_error(&e))?;
    }

    match trend {
        Some(fitted) => writeln!(
            writer,
            "Duration trend: {} ({:.1} ms per session)",
            trend_label(fitted),
            fitted.slope
        ),
        None => writeln!(writer, "Duration trend: not enough sessions"),
    }
    .map_err(|e| io_error(&e))
}

/// Renders a millisecond timestamp as UTC, falling back to the raw value.
fn format_start(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(
            || format!("{millis} ms"),
            |start| start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        )
}

const fn trend_label(trend: Trend) -> &'static str {
    match trend.direction {
        TrendDirection::Increasing => "increasing",
        TrendDirection::Decreasing => "decreasing",
        TrendDirection::Stable => "stable",
    }
}

/// Writes a component configuration to stdout as pretty JSON.
pub fn write_component(name: &str, document: &Value) -> Result<(), SimtrackError> {
    let mut stdout = io::stdout().lock();
    write_component_to(&mut stdout, name, document)
}

/// Writes a component configuration to the given writer as pretty JSON.
pub fn write_component_to<W: Write>(
    writer: &mut W,
    name: &str,
    document: &Value,
) -> Result<(), SimtrackError> {
    let rendered =
        serde_json::to_string_pretty(document).map_err(|error| SimtrackError::Io {
            message: format!("failed to render component '{name}': {error}"),
        })?;
    writeln!(writer, "{rendered}").map_err(|e| io_error(&e))
}

/// Converts an I/O error into [`SimtrackError::Io`].
pub fn io_error(error: &io::Error) -> SimtrackError {
    SimtrackError::Io {
        message: error.to_string(),
    }
}
