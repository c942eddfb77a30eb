//! Database migration operations.

use simtrack::persistence::{PersistenceError, migrate_database};
use simtrack::telemetry::StderrJsonlTelemetrySink;
use simtrack::{SimtrackConfig, SimtrackError};

/// Runs database migrations.
///
/// # Errors
///
/// Returns [`SimtrackError::Configuration`] if the database URL is missing or
/// blank, and [`SimtrackError::Storage`] for connection or migration failures.
pub fn run(config: &SimtrackConfig) -> Result<(), SimtrackError> {
    let database_url =
        config
            .database_url
            .as_deref()
            .ok_or_else(|| SimtrackError::Configuration {
                message: PersistenceError::MissingDatabaseUrl.to_string(),
            })?;

    let telemetry = StderrJsonlTelemetrySink;
    let schema_version = migrate_database(database_url, &telemetry)?;
    tracing::debug!("database at schema version {}", schema_version.as_str());
    Ok(())
}
