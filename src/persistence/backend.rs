//! Storage backends for the durable store.
//!
//! A backend maps physical keys to strings. It knows nothing about records,
//! codecs, or namespaces; those belong to [`super::DurableStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::PersistenceError;

/// Bytes used and, when the medium reports one, the byte quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageUsage {
    /// Bytes currently used by keys and values.
    pub used_bytes: u64,
    /// Total bytes available, if bounded.
    pub quota_bytes: Option<u64>,
}

impl StorageUsage {
    /// Returns usage as a whole percentage of the quota, if bounded.
    #[must_use]
    pub fn percent_used(&self) -> Option<u64> {
        let quota = self.quota_bytes.filter(|quota| *quota > 0)?;
        self.used_bytes.saturating_mul(100).checked_div(quota)
    }
}

/// A key-value medium the durable store can write to.
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs and notifications.
    fn name(&self) -> &'static str;

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the medium cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::QuotaExceeded`] when the medium is full;
    /// the previous value is left untouched.
    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Deletes `key`; missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the medium cannot be written.
    fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    /// Lists every key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the medium cannot be read.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError>;

    /// Reports storage usage.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the medium cannot be read.
    fn usage(&self) -> Result<StorageUsage, PersistenceError>;
}

/// Volatile backend with the same interface as the persistent ones.
///
/// Used directly in tests and as the last resort when no persistent medium
/// is usable.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryBackend {
    /// Creates an unbounded in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory backend refusing writes beyond `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, PersistenceError> {
        self.entries
            .lock()
            .map_err(|_| PersistenceError::Unavailable {
                message: "memory backend lock poisoned".to_owned(),
            })
    }
}

fn entry_size(key: &str, value: &str) -> u64 {
    u64::try_from(key.len().saturating_add(value.len())).unwrap_or(u64::MAX)
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let others: u64 = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| entry_size(existing, stored))
                .sum();
            let needed = others.saturating_add(entry_size(key, value));
            if needed > quota {
                return Err(PersistenceError::QuotaExceeded {
                    message: format!("{needed} bytes needed, quota is {quota}"),
                });
            }
        }
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn usage(&self) -> Result<StorageUsage, PersistenceError> {
        let used_bytes = self
            .lock()?
            .iter()
            .map(|(key, value)| entry_size(key, value))
            .sum();
        Ok(StorageUsage {
            used_bytes,
            quota_bytes: self.quota_bytes,
        })
    }
}

const PROBE_KEY: &str = "__simtrack_probe__";

/// Checks that a backend can write, read back, and delete a value.
///
/// # Errors
///
/// Returns the first [`PersistenceError`] hit during the round trip.
pub fn probe(backend: &dyn StorageBackend) -> Result<(), PersistenceError> {
    backend.write(PROBE_KEY, "1")?;
    let read_back = backend.read(PROBE_KEY)?;
    backend.delete(PROBE_KEY)?;
    if read_back.as_deref() == Some("1") {
        Ok(())
    } else {
        Err(PersistenceError::Unavailable {
            message: "probe value did not round-trip".to_owned(),
        })
    }
}

/// Picks the first candidate that passes [`probe`], else a [`MemoryBackend`].
///
/// The second element is `true` when the fallback was used.
#[must_use]
pub fn select_backend(
    candidates: Vec<Box<dyn StorageBackend>>,
) -> (Box<dyn StorageBackend>, bool) {
    for candidate in candidates {
        match probe(candidate.as_ref()) {
            Ok(()) => return (candidate, false),
            Err(error) => {
                tracing::warn!("storage backend '{}' unusable: {error}", candidate.name());
            }
        }
    }
    (Box::new(MemoryBackend::new()), true)
}
