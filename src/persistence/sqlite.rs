//! `SQLite` storage backend.
//!
//! Entries live in the `store_entries` table created by the embedded
//! migrations. Each operation opens its own connection so the backend can be
//! shared freely across tasks.

use diesel::OptionalExtension;
use diesel::QueryableByName;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;

use super::PersistenceError;
use super::backend::{StorageBackend, StorageUsage};
use super::migrator::{apply_migrations, establish};

const STORE_TABLE: &str = "store_entries";

/// Durable backend writing to a local `SQLite` file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    database_url: String,
    quota_bytes: Option<u64>,
}

impl SqliteBackend {
    /// Opens the database at `database_url` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the path is blank, the database
    /// cannot be opened, or migrations fail.
    pub fn open(
        database_url: impl Into<String>,
        quota_bytes: Option<u64>,
    ) -> Result<Self, PersistenceError> {
        let database_url_string = database_url.into();
        let mut connection = establish(&database_url_string)?;
        apply_migrations(&mut connection)?;

        Ok(Self {
            database_url: database_url_string,
            quota_bytes,
        })
    }

    /// Wraps an already-migrated database without touching it.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::BlankDatabaseUrl`] when the URL is blank.
    pub fn existing(
        database_url: impl Into<String>,
        quota_bytes: Option<u64>,
    ) -> Result<Self, PersistenceError> {
        let database_url_string = database_url.into();
        if database_url_string.trim().is_empty() {
            return Err(PersistenceError::BlankDatabaseUrl);
        }
        Ok(Self {
            database_url: database_url_string,
            quota_bytes,
        })
    }

    fn establish_connection(&self) -> Result<SqliteConnection, PersistenceError> {
        establish(&self.database_url)
    }

    fn used_bytes_excluding(
        connection: &mut SqliteConnection,
        key: &str,
    ) -> Result<u64, diesel::result::Error> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            total: i64,
        }

        let row: Row = sql_query(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) \
             AS total FROM store_entries WHERE key <> ?;",
        )
        .bind::<Text, _>(key)
        .get_result(connection)?;

        Ok(u64::try_from(row.total).unwrap_or(0))
    }

    fn check_quota(
        &self,
        connection: &mut SqliteConnection,
        key: &str,
        value: &str,
    ) -> Result<(), PersistenceError> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };
        let others = Self::used_bytes_excluding(connection, key)
            .map_err(|error| Self::map_query_error(connection, &error))?;
        let entry = u64::try_from(key.len().saturating_add(value.len())).unwrap_or(u64::MAX);
        let needed = others.saturating_add(entry);
        if needed > quota {
            return Err(PersistenceError::QuotaExceeded {
                message: format!("{needed} bytes needed, quota is {quota}"),
            });
        }
        Ok(())
    }

    fn store_table_exists(
        connection: &mut SqliteConnection,
    ) -> Result<bool, diesel::result::Error> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            one: i64,
        }

        let exists: Option<Row> = sql_query(
            "SELECT 1 AS one FROM sqlite_master WHERE type = 'table' AND name = ? LIMIT 1;",
        )
        .bind::<Text, _>(STORE_TABLE)
        .get_result(connection)
        .optional()?;

        Ok(exists.is_some_and(|row| row.one == 1))
    }

    fn map_error_with_schema_check<F>(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
        create_error: F,
    ) -> PersistenceError
    where
        F: Fn(String) -> PersistenceError,
    {
        match Self::store_table_exists(connection) {
            Ok(false) => PersistenceError::SchemaNotInitialised,
            Ok(true) => create_error(error.to_string()),
            Err(check_error) => create_error(format!(
                "schema presence check failed: {check_error}; original error: {error}"
            )),
        }
    }

    fn map_query_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> PersistenceError {
        Self::map_error_with_schema_check(connection, error, |message| {
            PersistenceError::QueryFailed { message }
        })
    }

    fn map_write_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> PersistenceError {
        if is_disk_full(error) {
            return PersistenceError::QuotaExceeded {
                message: error.to_string(),
            };
        }
        Self::map_error_with_schema_check(connection, error, |message| {
            PersistenceError::WriteFailed { message }
        })
    }
}

fn is_disk_full(error: &diesel::result::Error) -> bool {
    match error {
        diesel::result::Error::DatabaseError(_, info) => {
            let message = info.message().to_ascii_lowercase();
            message.contains("disk is full") || message.contains("database is full")
        }
        _ => false,
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            value: String,
        }

        let mut connection = self.establish_connection()?;
        let result: Option<Row> =
            sql_query("SELECT value FROM store_entries WHERE key = ? LIMIT 1;")
                .bind::<Text, _>(key)
                .get_result(&mut connection)
                .optional()
                .map_err(|error| Self::map_query_error(&mut connection, &error))?;

        Ok(result.map(|row| row.value))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut connection = self.establish_connection()?;
        self.check_quota(&mut connection, key, value)?;

        sql_query(
            "INSERT INTO store_entries (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET \
               value = excluded.value, \
               updated_at = CURRENT_TIMESTAMP;",
        )
        .bind::<Text, _>(key)
        .bind::<Text, _>(value)
        .execute(&mut connection)
        .map(drop)
        .map_err(|error| Self::map_write_error(&mut connection, &error))
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        let mut connection = self.establish_connection()?;
        sql_query("DELETE FROM store_entries WHERE key = ?;")
            .bind::<Text, _>(key)
            .execute(&mut connection)
            .map(drop)
            .map_err(|error| Self::map_write_error(&mut connection, &error))
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = Text)]
            key: String,
        }

        let mut connection = self.establish_connection()?;
        let rows: Vec<Row> = sql_query("SELECT key FROM store_entries ORDER BY key;")
            .load(&mut connection)
            .map_err(|error| Self::map_query_error(&mut connection, &error))?;

        Ok(rows
            .into_iter()
            .map(|row| row.key)
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    fn usage(&self) -> Result<StorageUsage, PersistenceError> {
        let mut connection = self.establish_connection()?;
        let used_bytes = Self::used_bytes_excluding(&mut connection, "")
            .map_err(|error| Self::map_query_error(&mut connection, &error))?;
        Ok(StorageUsage {
            used_bytes,
            quota_bytes: self.quota_bytes,
        })
    }
}
