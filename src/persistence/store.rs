//! Namespaced key-value store with optional compression, encryption, and TTL.
//!
//! Callers deal in logical keys and JSON-serialisable values. The store owns
//! the physical slots: it prefixes keys, wraps values in [`StoredRecord`]
//! envelopes, and never hands raw records back out.
//!
//! Reads favour availability. Missing, expired, undecodable, or corrupted
//! values all come back as the caller's default, and corrupted entries are
//! deleted so they do not fail again on the next read.
//!
//! There is no locking between independent writers sharing one backing
//! medium; the last write wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clock::Clock;
use crate::telemetry::{QuotaScope, TelemetryEvent, TelemetrySink};

use super::backend::{StorageBackend, StorageUsage, select_backend};
use super::compression::Compressors;
use super::encryption::{CipherKind, EncryptionKey, Encryptor};
use super::error::{CodecError, PersistenceError, StoreError};
use super::record::{RECORD_VERSION, RecordMetadata, StoredRecord, json_type_name};

/// Default namespace prefix for physical keys.
pub const DEFAULT_PREFIX: &str = "simulateai_";
/// Serialised length above which values are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;
/// Usage percentage at which a quota warning is emitted.
pub const DEFAULT_QUOTA_WARNING_PERCENT: u64 = 80;
/// Largest decompressed payload a read accepts.
pub const DEFAULT_MAX_DECODED_LEN: usize = 8 * 1024 * 1024;

const BACKUP_KEY: &str = "__backup";
/// Key words that mark a value as credential-like. A key is split into
/// words at `_`, `-`, `.`, `:` and lower-to-upper case changes; it matches
/// when one word, or two adjacent words joined, equals a marker. So
/// `authToken` and `private_key` match while `author_notes` does not.
const SENSITIVE_KEY_MARKERS: [&str; 12] = [
    "password",
    "passwd",
    "secret",
    "secrets",
    "token",
    "credential",
    "credentials",
    "auth",
    "authorization",
    "apikey",
    "privatekey",
    "passphrase",
];

/// Construction-time options for a [`DurableStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Prefix applied to every physical key.
    pub prefix: String,
    /// Serialised length above which values are compressed.
    pub compression_threshold: usize,
    /// Whether the zstd provider may be used.
    pub native_compression: bool,
    /// Key for authenticated encryption; `None` selects insecure encoding.
    pub encryption_key: Option<EncryptionKey>,
    /// Usage percentage that triggers [`TelemetryEvent::QuotaWarning`].
    pub quota_warning_percent: u64,
    /// Whether corrupted values are restored from the backup snapshot.
    pub auto_recover: bool,
    /// Decompressed length above which a stored payload is treated as
    /// corrupted.
    pub max_decoded_len: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            native_compression: true,
            encryption_key: None,
            quota_warning_percent: DEFAULT_QUOTA_WARNING_PERCENT,
            auto_recover: true,
            max_decoded_len: DEFAULT_MAX_DECODED_LEN,
        }
    }
}

/// Per-write options for [`DurableStore::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    /// Time-to-live in milliseconds.
    pub ttl: Option<u64>,
    /// Force encryption even for keys that do not look sensitive.
    pub encrypt: bool,
    /// Allow compression above the threshold.
    pub compress: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            encrypt: false,
            compress: true,
        }
    }
}

impl SetOptions {
    /// Sets a time-to-live in milliseconds.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Requests encryption.
    #[must_use]
    pub const fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    /// Disables compression.
    #[must_use]
    pub const fn uncompressed(mut self) -> Self {
        self.compress = false;
        self
    }
}

/// Returns true when `key` looks like it holds credentials.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let words = key_words(key);
    let is_marker = |candidate: &str| SENSITIVE_KEY_MARKERS.contains(&candidate);
    words.iter().any(|word| is_marker(word))
        || words
            .windows(2)
            .any(|pair| matches!(pair, [first, second] if is_marker(&format!("{first}{second}"))))
}

fn key_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for character in key.chars() {
        if !character.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if character.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = character.is_lowercase() || character.is_ascii_digit();
        current.extend(character.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Durable, namespaced key-value store.
pub struct DurableStore {
    backend: Box<dyn StorageBackend>,
    options: StoreOptions,
    compressors: Compressors,
    encryptor: Encryptor,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DurableStore")
            .field("backend", &self.backend.name())
            .field("prefix", &self.options.prefix)
            .field("secure", &self.encryptor.is_secure())
            .finish_non_exhaustive()
    }
}

impl DurableStore {
    /// Creates a store over an explicit backend.
    #[must_use]
    pub fn new(
        backend: Box<dyn StorageBackend>,
        options: StoreOptions,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let compressors = Compressors::new(options.native_compression);
        let encryptor = Encryptor::new(options.encryption_key.clone());
        Self {
            backend,
            options,
            compressors,
            encryptor,
            clock,
            telemetry,
        }
    }

    /// Creates a store over the first usable candidate backend, falling back
    /// to memory when none works.
    #[must_use]
    pub fn with_fallback(
        candidates: Vec<Box<dyn StorageBackend>>,
        options: StoreOptions,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let (backend, fell_back) = select_backend(candidates);
        if fell_back {
            telemetry.record(TelemetryEvent::StorageFallback {
                backend: backend.name().to_owned(),
            });
        }
        Self::new(backend, options, clock, telemetry)
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns `false` when "encrypted" values are only base64 encoded.
    #[must_use]
    pub const fn encryption_is_secure(&self) -> bool {
        self.encryptor.is_secure()
    }

    fn physical_key(&self, key: &str) -> String {
        format!("{}{key}", self.options.prefix)
    }

    fn backup_key(&self) -> String {
        self.physical_key(BACKUP_KEY)
    }

    /// Serialises `value` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`] when the medium is full (the
    /// previous value stays readable), [`StoreError::Serialization`] or
    /// [`StoreError::Encoding`] when the value cannot be encoded, and
    /// [`StoreError::Backend`] for other backend failures.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let result = self.try_set(key, value, options);
        if let Err(error) = &result {
            tracing::warn!("store set '{key}' failed: {error}");
        }
        result
    }

    fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_value(value).map_err(|error| StoreError::Serialization {
            key: key.to_owned(),
            message: error.to_string(),
        })?;
        let record = self.encode(key, &json, options)?;
        let raw = serde_json::to_string(&record).map_err(|error| StoreError::Serialization {
            key: key.to_owned(),
            message: error.to_string(),
        })?;

        match self.backend.write(&self.physical_key(key), &raw) {
            Ok(()) => {}
            Err(PersistenceError::QuotaExceeded { .. }) => {
                self.telemetry.record(TelemetryEvent::QuotaExceeded {
                    scope: QuotaScope::Storage {
                        key: key.to_owned(),
                    },
                    dropped: 0,
                });
                return Err(StoreError::QuotaExceeded {
                    key: key.to_owned(),
                });
            }
            Err(error) => return Err(error.into()),
        }

        self.telemetry.record(TelemetryEvent::DataUpdated {
            key: key.to_owned(),
        });
        self.watch_quota();
        Ok(())
    }

    fn encode(
        &self,
        key: &str,
        json: &Value,
        options: SetOptions,
    ) -> Result<StoredRecord, StoreError> {
        let serialised = json.to_string();
        let mut metadata = RecordMetadata {
            timestamp: self.clock.now_millis(),
            version: RECORD_VERSION.to_owned(),
            value_type: json_type_name(json).to_owned(),
            compressed: false,
            encrypted: false,
            ttl: options.ttl,
            codec: None,
            cipher: None,
        };

        let mut payload = serialised;
        if options.compress && payload.len() > self.options.compression_threshold {
            match self.compressors.compress(&payload) {
                Ok((codec, compressed)) => {
                    payload = compressed;
                    metadata.compressed = true;
                    metadata.codec = Some(codec);
                }
                Err(error) => {
                    tracing::warn!("storing '{key}' uncompressed: {error}");
                }
            }
        }

        if options.encrypt || is_sensitive_key(key) {
            let (cipher, sealed) =
                self.encryptor
                    .seal(&payload)
                    .map_err(|error| StoreError::Encoding {
                        key: key.to_owned(),
                        message: error.to_string(),
                    })?;
            payload = sealed;
            metadata.encrypted = true;
            metadata.cipher = Some(cipher);
        }

        Ok(StoredRecord {
            value: payload,
            metadata,
        })
    }

    fn watch_quota(&self) {
        let Ok(usage) = self.backend.usage() else {
            return;
        };
        let (Some(percent), Some(quota_bytes)) = (usage.percent_used(), usage.quota_bytes) else {
            return;
        };
        if percent >= self.options.quota_warning_percent {
            self.telemetry.record(TelemetryEvent::QuotaWarning {
                used_bytes: usage.used_bytes,
                quota_bytes,
            });
        }
    }

    /// Reads `key` and deserialises it, returning `default` on any failure.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(json) = self.get_value(key) else {
            return default;
        };
        match serde_json::from_value(json) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!("stored value for '{key}' has an unexpected shape: {error}");
                default
            }
        }
    }

    /// Reads `key` as untyped JSON.
    ///
    /// Expired entries are deleted. Corrupted entries are deleted and, when
    /// a backup holds the key, restored from it.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let physical = self.physical_key(key);
        let raw = match self.backend.read(&physical) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!("store get '{key}' failed: {error}");
                return None;
            }
        };

        match self.decode_raw(&raw) {
            Ok(Decoded::Value(value)) => Some(value),
            Ok(Decoded::Expired) => {
                tracing::debug!("'{key}' expired; removing");
                self.delete_quietly(&physical);
                None
            }
            Err(Unreadable::Locked(message)) => {
                tracing::warn!("'{key}' is kept but cannot be read: {message}");
                None
            }
            Err(Unreadable::Corrupted(message)) => self.recover_corrupted(key, &message),
        }
    }

    fn decode_raw(&self, raw: &str) -> Result<Decoded, Unreadable> {
        let record: StoredRecord = serde_json::from_str(raw)
            .map_err(|error| Unreadable::Corrupted(format!("bad envelope: {error}")))?;
        if record.metadata.is_expired(self.clock.now_millis()) {
            return Ok(Decoded::Expired);
        }
        self.decode_record(record).map(Decoded::Value)
    }

    fn decode_record(&self, record: StoredRecord) -> Result<Value, Unreadable> {
        let metadata = record.metadata;
        let mut payload = record.value;

        if metadata.encrypted {
            let cipher = metadata.cipher.unwrap_or(CipherKind::Base64Insecure);
            payload = self
                .encryptor
                .open(cipher, &payload)
                .map_err(Unreadable::from)?;
        }

        if metadata.compressed {
            let codec = metadata.codec.ok_or_else(|| {
                Unreadable::Corrupted("compressed record names no codec".to_owned())
            })?;
            if !codec.looks_valid(&payload) {
                return Err(Unreadable::Corrupted(format!(
                    "payload does not look like {} data",
                    codec.name()
                )));
            }
            payload = codec
                .decompress(&payload, self.options.max_decoded_len)
                .map_err(Unreadable::from)?;
        }

        serde_json::from_str(&payload)
            .map_err(|error| Unreadable::Corrupted(format!("bad JSON payload: {error}")))
    }

    fn recover_corrupted(&self, key: &str, reason: &str) -> Option<Value> {
        tracing::warn!("discarding corrupted value for '{key}': {reason}");
        self.delete_quietly(&self.physical_key(key));

        let restored = if self.options.auto_recover {
            self.restore_from_backup(key)
        } else {
            None
        };

        self.telemetry.record(TelemetryEvent::CorruptionDetected {
            key: key.to_owned(),
            recovered: restored.is_some(),
        });
        restored
    }

    fn restore_from_backup(&self, key: &str) -> Option<Value> {
        let snapshot = self.read_backup().ok()??;
        let raw = snapshot.get(key)?;
        let Ok(Decoded::Value(value)) = self.decode_raw(raw) else {
            return None;
        };
        if let Err(error) = self.backend.write(&self.physical_key(key), raw) {
            tracing::warn!("failed to restore '{key}' from backup: {error}");
        }
        Some(value)
    }

    fn delete_quietly(&self, physical: &str) {
        if let Err(error) = self.backend.delete(physical) {
            tracing::warn!("failed to delete '{physical}': {error}");
        }
    }

    /// Returns true when `key` currently holds a readable value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get_value(key).is_some()
    }

    /// Deletes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend
            .delete(&self.physical_key(key))
            .map_err(StoreError::from)
    }

    /// Deletes every key in this store's namespace, returning how many.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let keys = self.backend.keys_with_prefix(&self.options.prefix)?;
        for physical in &keys {
            self.backend.delete(physical)?;
        }
        Ok(keys.len())
    }

    /// Lists logical keys, excluding the backup snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let backup = self.backup_key();
        Ok(self
            .backend
            .keys_with_prefix(&self.options.prefix)?
            .into_iter()
            .filter(|physical| *physical != backup)
            .filter_map(|physical| {
                physical
                    .strip_prefix(self.options.prefix.as_str())
                    .map(ToOwned::to_owned)
            })
            .collect())
    }

    /// Reports storage usage of the backing medium.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    pub fn usage(&self) -> Result<StorageUsage, StoreError> {
        self.backend.usage().map_err(StoreError::from)
    }

    /// Snapshots every raw record so corrupted values can be restored later.
    ///
    /// Returns the number of entries captured.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when records cannot be read or the snapshot
    /// cannot be written.
    pub fn create_backup(&self) -> Result<usize, StoreError> {
        let mut snapshot = BTreeMap::new();
        for key in self.keys()? {
            if let Some(raw) = self.backend.read(&self.physical_key(&key))? {
                snapshot.insert(key, raw);
            }
        }
        let raw = serde_json::to_string(&snapshot).map_err(|error| StoreError::Serialization {
            key: BACKUP_KEY.to_owned(),
            message: error.to_string(),
        })?;
        match self.backend.write(&self.backup_key(), &raw) {
            Ok(()) => Ok(snapshot.len()),
            Err(PersistenceError::QuotaExceeded { .. }) => Err(StoreError::QuotaExceeded {
                key: BACKUP_KEY.to_owned(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Writes every record in the backup snapshot back to its key.
    ///
    /// Returns the number of entries restored; zero when no backup exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the snapshot is unreadable or a write
    /// fails.
    pub fn restore_backup(&self) -> Result<usize, StoreError> {
        let Some(snapshot) = self.read_backup()? else {
            return Ok(0);
        };
        for (key, raw) in &snapshot {
            self.backend.write(&self.physical_key(key), raw)?;
        }
        Ok(snapshot.len())
    }

    fn read_backup(&self) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        let Some(raw) = self.backend.read(&self.backup_key())? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|error| StoreError::Corrupted {
                key: BACKUP_KEY.to_owned(),
                message: error.to_string(),
            })
    }

    /// Returns every readable logical value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when keys cannot be listed.
    pub fn export(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter_map(|key| self.get_value(&key).map(|value| (key, value)))
            .collect())
    }

    /// Writes every entry of `values` with default options.
    ///
    /// Returns the number of values written.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first write error.
    pub fn import(&self, values: &BTreeMap<String, Value>) -> Result<usize, StoreError> {
        for (key, value) in values {
            self.set(key, value, SetOptions::default())?;
        }
        Ok(values.len())
    }

    #[cfg(test)]
    pub(crate) fn write_raw(&self, key: &str, raw: &str) -> Result<(), StoreError> {
        self.backend
            .write(&self.physical_key(key), raw)
            .map_err(StoreError::from)
    }

    #[cfg(test)]
    pub(crate) fn read_raw(&self, key: &str) -> Option<String> {
        self.backend.read(&self.physical_key(key)).ok().flatten()
    }
}

enum Decoded {
    Value(Value),
    Expired,
}

/// Why a stored record could not be turned back into a value.
enum Unreadable {
    /// The record is damaged and should be discarded.
    Corrupted(String),
    /// The record needs a provider this store lacks, such as a missing key.
    Locked(String),
}

impl From<CodecError> for Unreadable {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Unavailable { .. } => Self::Locked(error.to_string()),
            CodecError::Encode { .. } | CodecError::Decode { .. } => {
                Self::Corrupted(error.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
