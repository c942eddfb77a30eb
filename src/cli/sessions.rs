//! Prints session history and the duration trend.

use std::sync::Arc;

use simtrack::clock::{RandomIdGenerator, SystemClock};
use simtrack::telemetry::NoopTelemetrySink;
use simtrack::{SessionTracker, SimtrackConfig, SimtrackError};

use super::output::write_session_report;
use super::wiring::open_store;

/// Reads session history from the durable store and prints it.
///
/// Reading history never starts a new session.
///
/// # Errors
///
/// Returns [`SimtrackError`] when configuration is invalid or the report
/// cannot be written.
pub fn run(config: &SimtrackConfig) -> Result<(), SimtrackError> {
    let settings = config.tracker_settings()?;
    let store = open_store(config, Arc::new(SystemClock), Arc::new(NoopTelemetrySink))?;
    let sessions = SessionTracker::new(
        store,
        Arc::new(SystemClock),
        Arc::new(RandomIdGenerator),
        Arc::new(NoopTelemetrySink),
        settings.session,
    );

    write_session_report(&sessions.history(), sessions.duration_trend())
}
