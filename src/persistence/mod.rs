//! Local persistence: the durable key-value store and its backends.
//!
//! The store persists to a local `SQLite` database when one is configured
//! and usable, and otherwise falls back to memory behind the same
//! interface. The `SQLite` schema is managed with Diesel migrations so the
//! database can be created and upgraded consistently across machines.

mod backend;
mod compression;
mod encryption;
mod error;
mod migrator;
mod record;
mod sqlite;
mod store;

pub use backend::{MemoryBackend, StorageBackend, StorageUsage, probe, select_backend};
pub use compression::{CompressionCodec, Compressors, rle_compress, rle_decompress};
pub use encryption::{CipherKind, EncryptionKey, Encryptor};
pub use error::{CodecError, PersistenceError, StoreError};
pub use migrator::{CURRENT_SCHEMA_VERSION, SchemaVersion, migrate_database};
pub use record::{RECORD_VERSION, RecordMetadata, StoredRecord};
pub use sqlite::SqliteBackend;
pub use store::{
    DEFAULT_COMPRESSION_THRESHOLD, DEFAULT_MAX_DECODED_LEN, DEFAULT_PREFIX,
    DEFAULT_QUOTA_WARNING_PERCENT, DurableStore,
    SetOptions, StoreOptions, is_sensitive_key,
};
