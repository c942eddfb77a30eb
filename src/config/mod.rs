//! Application configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.simtrack.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `SIMTRACK_ENDPOINT`,
//!    `SIMTRACK_DATABASE_URL`, and so on
//! 4. **Command-line arguments** – `--endpoint`/`-e`, `--database-url`, ...
//!
//! # Configuration File
//!
//! ```toml
//! endpoint = "https://collector.example/events"
//! auth_token = "secret"
//! database_url = "simtrack.sqlite"
//! batch_size = 25
//! flush_interval_ms = 15000
//! privacy_mode = true
//! ```

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::analytics::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_LANGUAGE, DEFAULT_MAX_FLUSH_INTERVAL,
    DEFAULT_MAX_LOCAL_BATCHES, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_RETRY_QUEUE_SIZE,
    DEFAULT_MIN_FLUSH_INTERVAL, DEFAULT_QUEUE_TRIM_SIZE, DEFAULT_REQUEST_TIMEOUT, TrackerSettings,
};
use crate::error::SimtrackError;
use crate::persistence::{
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_PREFIX, EncryptionKey, StoreOptions,
};
use crate::session::{DEFAULT_HISTORY_LIMIT, DEFAULT_SESSION_TTL_MS, SessionSettings};

/// Operation selected by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Apply database migrations and exit.
    MigrateDatabase,
    /// Print session history and the duration trend.
    ShowSessions,
    /// Print one component configuration.
    ShowComponent,
    /// Read JSON-lines events from stdin and deliver them.
    Ingest,
}

/// Application configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `SIMTRACK_ENDPOINT` or `--endpoint`: Remote collector URL
/// - `SIMTRACK_AUTH_TOKEN` or `--auth-token`: Bearer token for the collector
/// - `SIMTRACK_DATABASE_URL` or `--database-url`: Local `SQLite` database path
/// - `SIMTRACK_ENCRYPTION_KEY` or `--encryption-key`: Base64 storage key
///
/// # Example
///
/// ```no_run
/// use ortho_config::OrthoConfig;
/// use simtrack::SimtrackConfig;
///
/// let config = SimtrackConfig::load().expect("failed to load configuration");
/// let settings = config.tracker_settings().expect("invalid tracker settings");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "SIMTRACK",
    discovery(
        dotfile_name = ".simtrack.toml",
        config_file_name = "simtrack.toml",
        app_name = "simtrack"
    )
)]
pub struct SimtrackConfig {
    /// Local `SQLite` database URL/path used for the durable store.
    ///
    /// When absent, or when the database cannot be used, values live in
    /// memory for the lifetime of the process.
    ///
    /// Can be provided via:
    /// - CLI: `--database-url <PATH>`
    /// - Environment: `SIMTRACK_DATABASE_URL`
    /// - Config file: `database_url = "..."`
    #[ortho_config()]
    pub database_url: Option<String>,

    /// Runs database migrations and exits.
    ///
    /// Can be provided via:
    /// - CLI: `--migrate-db`
    /// - Config file: `migrate_db = true`
    #[ortho_config()]
    pub migrate_db: bool,

    /// Remote collector URL; batches are stored locally when absent.
    ///
    /// Can be provided via:
    /// - CLI: `--endpoint <URL>` or `-e <URL>`
    /// - Environment: `SIMTRACK_ENDPOINT`
    /// - Config file: `endpoint = "..."`
    #[ortho_config(cli_short = 'e')]
    pub endpoint: Option<String>,

    /// Bearer token sent with each transmission.
    #[ortho_config()]
    pub auth_token: Option<String>,

    /// Base64-encoded 32-byte key for encrypting sensitive stored values.
    ///
    /// Without a key, sensitive values are only obfuscated.
    #[ortho_config()]
    pub encryption_key: Option<String>,

    /// Prefix applied to every physical storage key.
    #[ortho_config()]
    pub storage_prefix: String,

    /// Storage quota in bytes; unlimited when absent.
    #[ortho_config()]
    pub storage_quota_bytes: Option<u64>,

    /// Queue length that requests an early flush.
    #[ortho_config(cli_short = 'b')]
    pub batch_size: usize,

    /// Starting flush interval, in milliseconds.
    #[ortho_config()]
    pub flush_interval_ms: u64,

    /// Shortest adaptive flush interval, in milliseconds.
    #[ortho_config()]
    pub min_flush_interval_ms: u64,

    /// Longest adaptive flush interval, in milliseconds.
    #[ortho_config()]
    pub max_flush_interval_ms: u64,

    /// Queue length above which the oldest events are dropped.
    #[ortho_config()]
    pub max_queue_size: usize,

    /// Queue length kept after dropping.
    #[ortho_config()]
    pub queue_trim_size: usize,

    /// Events held for replay after failed transmissions.
    #[ortho_config()]
    pub max_retry_queue_size: usize,

    /// Locally stored batches kept when no endpoint is configured.
    #[ortho_config()]
    pub max_local_batches: usize,

    /// Ended sessions kept in history.
    #[ortho_config()]
    pub session_history_limit: usize,

    /// Lifetime of a persisted session identifier, in milliseconds.
    #[ortho_config()]
    pub session_ttl_ms: u64,

    /// Size above which stored values and request bodies are compressed.
    #[ortho_config()]
    pub compression_threshold_bytes: usize,

    /// Upper bound on one transmission, in milliseconds.
    #[ortho_config()]
    pub request_timeout_ms: u64,

    /// Language tag reported in event context.
    #[ortho_config()]
    pub language: String,

    /// Floors event timestamps to the hour.
    ///
    /// Can be provided via:
    /// - CLI: `--privacy-mode` / `-p`
    /// - Config file: `privacy_mode = true`
    #[ortho_config(cli_short = 'p')]
    pub privacy_mode: bool,

    /// Enables debug logging and loud reporting of dropped events.
    #[ortho_config(cli_short = 'd')]
    pub debug: bool,

    /// Prints session history and the duration trend, then exits.
    #[ortho_config(cli_short = 's')]
    pub show_sessions: bool,

    /// Directory holding `<component>.json` configuration files.
    #[ortho_config()]
    pub component_config_dir: Option<String>,

    /// Component whose configuration should be printed.
    #[ortho_config(cli_short = 'c')]
    pub component: Option<String>,
}

impl Default for SimtrackConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            migrate_db: false,
            endpoint: None,
            auth_token: None,
            encryption_key: None,
            storage_prefix: DEFAULT_PREFIX.to_owned(),
            storage_quota_bytes: None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: duration_ms(DEFAULT_FLUSH_INTERVAL),
            min_flush_interval_ms: duration_ms(DEFAULT_MIN_FLUSH_INTERVAL),
            max_flush_interval_ms: duration_ms(DEFAULT_MAX_FLUSH_INTERVAL),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            queue_trim_size: DEFAULT_QUEUE_TRIM_SIZE,
            max_retry_queue_size: DEFAULT_MAX_RETRY_QUEUE_SIZE,
            max_local_batches: DEFAULT_MAX_LOCAL_BATCHES,
            session_history_limit: DEFAULT_HISTORY_LIMIT,
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD,
            request_timeout_ms: duration_ms(DEFAULT_REQUEST_TIMEOUT),
            language: DEFAULT_LANGUAGE.to_owned(),
            privacy_mode: false,
            debug: false,
            show_sessions: false,
            component_config_dir: None,
            component: None,
        }
    }
}

impl SimtrackConfig {
    /// Determines the operation mode.
    ///
    /// Migration wins over everything else, then session history, then a
    /// component lookup; ingesting events from stdin is the default.
    #[must_use]
    pub const fn operation_mode(&self) -> OperationMode {
        if self.migrate_db {
            OperationMode::MigrateDatabase
        } else if self.show_sessions {
            OperationMode::ShowSessions
        } else if self.component.is_some() {
            OperationMode::ShowComponent
        } else {
            OperationMode::Ingest
        }
    }

    /// Parses the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SimtrackError::Configuration`] when the endpoint is not an
    /// absolute `http` or `https` URL.
    pub fn endpoint_url(&self) -> Result<Option<Url>, SimtrackError> {
        let Some(raw) = self.endpoint.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw.trim()).map_err(|error| SimtrackError::Configuration {
            message: format!("endpoint '{raw}' is not a valid URL: {error}"),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(Some(url)),
            scheme => Err(SimtrackError::Configuration {
                message: format!("endpoint scheme must be http or https, got '{scheme}'"),
            }),
        }
    }

    /// Builds validated tracker settings.
    ///
    /// # Errors
    ///
    /// Returns [`SimtrackError::Configuration`] when the endpoint is invalid,
    /// the batch size is zero, the trim size exceeds the queue bound, or the
    /// flush interval lies outside its bounds.
    pub fn tracker_settings(&self) -> Result<TrackerSettings, SimtrackError> {
        let endpoint = self.endpoint_url()?;
        if self.batch_size == 0 {
            return Err(configuration("batch_size must be at least 1"));
        }
        if self.queue_trim_size > self.max_queue_size {
            return Err(configuration(
                "queue_trim_size must not exceed max_queue_size",
            ));
        }
        if self.min_flush_interval_ms > self.max_flush_interval_ms {
            return Err(configuration(
                "min_flush_interval_ms must not exceed max_flush_interval_ms",
            ));
        }
        if !(self.min_flush_interval_ms..=self.max_flush_interval_ms)
            .contains(&self.flush_interval_ms)
        {
            return Err(configuration(
                "flush_interval_ms must lie between min_flush_interval_ms and max_flush_interval_ms",
            ));
        }

        Ok(TrackerSettings {
            endpoint,
            auth_token: self.auth_token.clone(),
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            min_flush_interval: Duration::from_millis(self.min_flush_interval_ms),
            max_flush_interval: Duration::from_millis(self.max_flush_interval_ms),
            max_queue_size: self.max_queue_size,
            queue_trim_size: self.queue_trim_size,
            max_retry_queue_size: self.max_retry_queue_size,
            max_local_batches: self.max_local_batches,
            compression_threshold: self.compression_threshold_bytes,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            privacy_mode: self.privacy_mode,
            debug: self.debug,
            language: self.language.clone(),
            session: SessionSettings {
                history_limit: self.session_history_limit,
                session_ttl_ms: self.session_ttl_ms,
            },
        })
    }

    /// Builds validated durable store options.
    ///
    /// # Errors
    ///
    /// Returns [`SimtrackError::Configuration`] when the encryption key is
    /// not base64 of exactly 32 bytes or the storage prefix is blank.
    pub fn store_options(&self) -> Result<StoreOptions, SimtrackError> {
        if self.storage_prefix.trim().is_empty() {
            return Err(configuration("storage_prefix must not be blank"));
        }
        let encryption_key = self
            .encryption_key
            .as_deref()
            .map(EncryptionKey::from_base64)
            .transpose()
            .map_err(|error| SimtrackError::Configuration {
                message: format!("encryption_key is invalid: {error}"),
            })?;
        Ok(StoreOptions {
            prefix: self.storage_prefix.clone(),
            compression_threshold: self.compression_threshold_bytes,
            encryption_key,
            ..StoreOptions::default()
        })
    }
}

fn configuration(message: &str) -> SimtrackError {
    SimtrackError::Configuration {
        message: message.to_owned(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests;
