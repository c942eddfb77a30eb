//! Logging and durable store set-up shared by the CLI handlers.

use std::sync::Arc;

use simtrack::clock::Clock;
use simtrack::persistence::{DurableStore, MemoryBackend, SqliteBackend, StorageBackend};
use simtrack::telemetry::{TelemetryEvent, TelemetrySink};
use simtrack::{SimtrackConfig, SimtrackError};
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "warn";
/// Filter installed by `--debug`.
const DEBUG_LOG_FILTER: &str = "simtrack=debug";

/// Installs the stderr `tracing` subscriber.
///
/// `--debug` overrides `RUST_LOG`. Installing twice is harmless.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new(DEBUG_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };
    let _ignored = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Candidate backends in preference order.
///
/// A configured database comes first and memory last, so the store falls
/// back to memory when the database cannot be used. A database that cannot
/// even be opened is reported as a fallback straight away.
///
/// # Errors
///
/// Returns [`SimtrackError::Configuration`] when the database URL is blank.
pub fn backend_candidates(
    config: &SimtrackConfig,
    telemetry: &dyn TelemetrySink,
) -> Result<Vec<Box<dyn StorageBackend>>, SimtrackError> {
    let quota = config.storage_quota_bytes;
    let memory: Box<dyn StorageBackend> = match quota {
        Some(bytes) => Box::new(MemoryBackend::with_quota(bytes)),
        None => Box::new(MemoryBackend::new()),
    };

    let Some(database_url) = config.database_url.as_deref() else {
        return Ok(vec![memory]);
    };
    match SqliteBackend::open(database_url, quota) {
        Ok(sqlite) => Ok(vec![Box::new(sqlite), memory]),
        Err(error) => {
            let mapped = SimtrackError::from(error);
            if matches!(mapped, SimtrackError::Configuration { .. }) {
                return Err(mapped);
            }
            tracing::warn!("database '{database_url}' unusable, keeping data in memory: {mapped}");
            telemetry.record(TelemetryEvent::StorageFallback {
                backend: memory.name().to_owned(),
            });
            Ok(vec![memory])
        }
    }
}

/// Opens the durable store described by `config`.
///
/// # Errors
///
/// Returns [`SimtrackError::Configuration`] when the store options or the
/// database URL are invalid.
pub fn open_store(
    config: &SimtrackConfig,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
) -> Result<Arc<DurableStore>, SimtrackError> {
    let options = config.store_options()?;
    let candidates = backend_candidates(config, telemetry.as_ref())?;
    let store = DurableStore::with_fallback(candidates, options, clock, telemetry);
    tracing::debug!("durable store using '{}' backend", store.backend_name());
    Ok(Arc::new(store))
}
