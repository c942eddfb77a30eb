//! Error types for local persistence operations.

use thiserror::Error;

/// Errors returned by storage backends and the migration runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// No database URL/path was provided.
    #[error("database URL is required (use --database-url or SIMTRACK_DATABASE_URL)")]
    MissingDatabaseUrl,

    /// The database URL/path was present but blank.
    #[error("database URL must not be blank")]
    BlankDatabaseUrl,

    /// Establishing a `SQLite` connection failed.
    #[error("failed to connect to SQLite database: {message}")]
    ConnectionFailed {
        /// Error detail from Diesel.
        message: String,
    },

    /// Running pending migrations failed.
    #[error("failed to run database migrations: {message}")]
    MigrationFailed {
        /// Error detail from Diesel migrations.
        message: String,
    },

    /// Reading the schema version from the migration table failed.
    #[error("failed to read schema version after migrations: {message}")]
    SchemaVersionQueryFailed {
        /// Error detail from Diesel query execution.
        message: String,
    },

    /// The migrations completed but no schema version could be found.
    #[error("no schema version recorded after migrations ran")]
    MissingSchemaVersion,

    /// The store table is missing because migrations never ran.
    #[error("store schema is not initialised; run --migrate-db first")]
    SchemaNotInitialised,

    /// A read query failed.
    #[error("storage query failed: {message}")]
    QueryFailed {
        /// Error detail from the backend.
        message: String,
    },

    /// A write failed for a reason other than quota.
    #[error("storage write failed: {message}")]
    WriteFailed {
        /// Error detail from the backend.
        message: String,
    },

    /// The backing medium refused a write because it is full.
    #[error("storage quota exceeded: {message}")]
    QuotaExceeded {
        /// Detail describing the refused write.
        message: String,
    },

    /// The backend cannot be used at all.
    #[error("storage backend unavailable: {message}")]
    Unavailable {
        /// Why the backend is unusable.
        message: String,
    },
}

/// Errors surfaced by [`crate::persistence::DurableStore`] operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The write would exceed the storage quota; the previous value is kept.
    #[error("storage quota exceeded while writing '{key}'")]
    QuotaExceeded {
        /// Logical key of the refused write.
        key: String,
    },

    /// The value could not be serialised or deserialised as JSON.
    #[error("serialisation failed for '{key}': {message}")]
    Serialization {
        /// Logical key involved.
        key: String,
        /// Error detail from `serde_json`.
        message: String,
    },

    /// Compression or encryption failed while writing.
    #[error("failed to encode '{key}': {message}")]
    Encoding {
        /// Logical key involved.
        key: String,
        /// Provider error detail.
        message: String,
    },

    /// The stored payload is corrupted.
    #[error("stored value for '{key}' is corrupted: {message}")]
    Corrupted {
        /// Logical key involved.
        key: String,
        /// What failed to decode.
        message: String,
    },

    /// The backend reported a failure.
    #[error(transparent)]
    Backend(#[from] PersistenceError),
}

/// Failures inside a compression or encryption provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The provider cannot run on this host (missing key, disabled codec).
    #[error("{provider} is unavailable: {message}")]
    Unavailable {
        /// Provider name.
        provider: &'static str,
        /// Why it is unavailable.
        message: String,
    },

    /// Encoding failed.
    #[error("{provider} failed to encode: {message}")]
    Encode {
        /// Provider name.
        provider: &'static str,
        /// Error detail.
        message: String,
    },

    /// Decoding failed, which usually means the payload is corrupted.
    #[error("{provider} failed to decode: {message}")]
    Decode {
        /// Provider name.
        provider: &'static str,
        /// Error detail.
        message: String,
    },
}
