//! Schema management for the `SQLite` event store.
//!
//! Migrations are compiled into the binary and applied in order; the newest
//! applied version is the store's schema version.

use diesel::Connection;
use diesel::OptionalExtension;
use diesel::QueryableByName;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::Text;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::telemetry::{TelemetryEvent, TelemetrySink};

use super::PersistenceError;

/// Migrations compiled in from `migrations/`.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Version of the newest migration under `migrations/`.
pub const CURRENT_SCHEMA_VERSION: &str = "20260101000000";

/// Version label of the newest applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    /// Borrows the version label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Brings the database at `database_url` up to [`CURRENT_SCHEMA_VERSION`]
/// and reports the version through `telemetry`.
///
/// # Errors
///
/// Returns [`PersistenceError`] for a blank or unusable URL, a failing
/// migration, or an unreadable version table.
pub fn migrate_database(
    database_url: &str,
    telemetry: &dyn TelemetrySink,
) -> Result<SchemaVersion, PersistenceError> {
    let mut connection = establish(database_url)?;
    let schema_version = apply_migrations(&mut connection)?;

    telemetry.record(TelemetryEvent::SchemaVersionRecorded {
        schema_version: schema_version.as_str().to_owned(),
    });

    Ok(schema_version)
}

/// Opens a connection to `database_url`, rejecting blank paths.
pub(crate) fn establish(database_url: &str) -> Result<SqliteConnection, PersistenceError> {
    let database_url_trimmed = database_url.trim();
    if database_url_trimmed.is_empty() {
        return Err(PersistenceError::BlankDatabaseUrl);
    }

    SqliteConnection::establish(database_url_trimmed).map_err(|error| {
        PersistenceError::ConnectionFailed {
            message: error.to_string(),
        }
    })
}

/// Applies pending migrations on an open connection.
pub(crate) fn apply_migrations(
    connection: &mut SqliteConnection,
) -> Result<SchemaVersion, PersistenceError> {
    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|error| PersistenceError::MigrationFailed {
            message: error.to_string(),
        })?;

    read_schema_version(connection)
}

fn read_schema_version(
    connection: &mut SqliteConnection,
) -> Result<SchemaVersion, PersistenceError> {
    #[derive(Debug, QueryableByName)]
    struct Row {
        #[diesel(sql_type = Text)]
        version: String,
    }

    let result: Option<Row> =
        sql_query("SELECT version FROM __diesel_schema_migrations ORDER BY version DESC LIMIT 1;")
            .get_result(connection)
            .optional()
            .map_err(|error| PersistenceError::SchemaVersionQueryFailed {
                message: error.to_string(),
            })?;

    let Some(row) = result else {
        return Err(PersistenceError::MissingSchemaVersion);
    };

    Ok(SchemaVersion(row.version))
}
