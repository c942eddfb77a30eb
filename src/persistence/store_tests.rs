//! Unit tests for the durable store.

use std::collections::BTreeMap;
use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::{DurableStore, SetOptions, StoreOptions, is_sensitive_key};
use crate::clock::ManualClock;
use crate::persistence::backend::{MemoryBackend, StorageBackend};
use crate::persistence::encryption::EncryptionKey;
use crate::persistence::error::{PersistenceError, StoreError};
use crate::persistence::record::StoredRecord;
use crate::persistence::StorageUsage;
use crate::persistence::compression::CompressionCodec;
use crate::telemetry::test_support::RecordingSink;
use crate::telemetry::{QuotaScope, TelemetryEvent};

struct Harness {
    store: DurableStore,
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
}

fn harness_with(backend: MemoryBackend, options: StoreOptions) -> Harness {
    let clock = Arc::new(ManualClock::new(1_000));
    let sink = Arc::new(RecordingSink::default());
    let store = DurableStore::new(Box::new(backend), options, clock.clone(), sink.clone());
    Harness { store, clock, sink }
}

#[fixture]
fn harness() -> Harness {
    harness_with(MemoryBackend::new(), StoreOptions::default())
}

fn large_value() -> Value {
    json!({
        "decisions": (0..200).map(|index| json!({"step": index, "choice": "aaaa"})).collect::<Vec<_>>(),
        "label": "bulk",
    })
}

fn raw_record(harness: &Harness, key: &str) -> StoredRecord {
    let raw = harness.store.read_raw(key).expect("raw record should exist");
    serde_json::from_str(&raw).expect("raw record should parse")
}

#[rstest]
#[case::plain(false, false, true)]
#[case::compressed(true, false, true)]
#[case::encrypted(false, true, true)]
#[case::compressed_and_encrypted(true, true, true)]
#[case::compressed_rle(true, false, false)]
#[case::compressed_rle_encrypted(true, true, false)]
fn values_round_trip_across_codec_combinations(
    #[case] compress: bool,
    #[case] encrypt: bool,
    #[case] native: bool,
) {
    let harness = harness_with(
        MemoryBackend::new(),
        StoreOptions {
            encryption_key: Some(EncryptionKey::generate()),
            native_compression: native,
            ..StoreOptions::default()
        },
    );
    let mut options = SetOptions::default();
    if !compress {
        options = options.uncompressed();
    }
    if encrypt {
        options = options.encrypted();
    }
    let value = large_value();

    harness.store.set("progress", &value, options).expect("set");

    assert_eq!(harness.store.get_value("progress"), Some(value));
    let record = raw_record(&harness, "progress");
    assert_eq!(record.metadata.compressed, compress);
    assert_eq!(record.metadata.encrypted, encrypt);
}

#[rstest]
fn small_values_are_not_compressed(harness: Harness) {
    harness
        .store
        .set("prefs", &json!({"theme": "dark"}), SetOptions::default())
        .expect("set");

    let record = raw_record(&harness, "prefs");
    assert!(!record.metadata.compressed);
    assert_eq!(record.metadata.value_type, "object");
}

#[rstest]
fn typed_get_falls_back_to_default(harness: Harness) {
    harness
        .store
        .set("count", &"not a number", SetOptions::default())
        .expect("set");

    assert_eq!(harness.store.get("count", 7_u32), 7);
    assert_eq!(harness.store.get("missing", 3_u32), 3);
}

#[rstest]
fn expired_values_return_default_and_are_removed(harness: Harness) {
    harness
        .store
        .set("flash", &json!("soon gone"), SetOptions::default().with_ttl(100))
        .expect("set");

    harness.clock.advance(100);
    assert_eq!(harness.store.get_value("flash"), Some(json!("soon gone")));

    harness.clock.advance(1);
    assert_eq!(harness.store.get("flash", String::from("default")), "default");
    assert!(harness.store.read_raw("flash").is_none(), "expired key should be deleted");
}

#[test]
fn quota_exhaustion_keeps_previous_value() {
    let harness = harness_with(MemoryBackend::with_quota(400), StoreOptions::default());
    harness
        .store
        .set("prefs", &json!({"theme": "dark"}), SetOptions::default())
        .expect("first write fits");
    let _ignored = harness.sink.take();

    let result = harness.store.set(
        "prefs",
        &json!({"theme": "x".repeat(1_000)}),
        SetOptions::default().uncompressed(),
    );

    assert_eq!(
        result,
        Err(StoreError::QuotaExceeded {
            key: "prefs".to_owned()
        })
    );
    assert_eq!(
        harness.store.get_value("prefs"),
        Some(json!({"theme": "dark"}))
    );
    assert_eq!(
        harness.sink.take(),
        vec![TelemetryEvent::QuotaExceeded {
            scope: QuotaScope::Storage {
                key: "prefs".to_owned()
            },
            dropped: 0,
        }]
    );
}

#[test]
fn quota_warning_fires_near_capacity() {
    let harness = harness_with(MemoryBackend::with_quota(300), StoreOptions::default());

    harness
        .store
        .set("notes", &"n".repeat(150), SetOptions::default())
        .expect("set");

    let events = harness.sink.take();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, TelemetryEvent::QuotaWarning { quota_bytes: 300, .. })),
        "expected a quota warning, got {events:?}"
    );
}

#[rstest]
fn successful_writes_emit_data_updated(harness: Harness) {
    harness
        .store
        .set("prefs", &json!(1), SetOptions::default())
        .expect("set");

    assert_eq!(
        harness.sink.take(),
        vec![TelemetryEvent::DataUpdated {
            key: "prefs".to_owned()
        }]
    );
}

#[rstest]
#[case::password("user_password", true)]
#[case::token("authToken", true)]
#[case::snake_segment("refresh_token", true)]
#[case::joined_words("private_key", true)]
#[case::acronym("APIKey", true)]
#[case::author("author_notes", false)]
#[case::private_mode("private_mode_pref", false)]
#[case::preferences("preferences", false)]
fn sensitive_keys_are_detected(#[case] key: &str, #[case] expected: bool) {
    assert_eq!(is_sensitive_key(key), expected);
}

#[rstest]
fn sensitive_keys_are_encrypted_without_asking(harness: Harness) {
    harness
        .store
        .set("api_token", &json!("abc"), SetOptions::default())
        .expect("set");

    let record = raw_record(&harness, "api_token");
    assert!(record.metadata.encrypted);
    assert!(!harness.store.encryption_is_secure());
    assert_eq!(harness.store.get_value("api_token"), Some(json!("abc")));
}

#[rstest]
fn corrupted_compressed_payload_is_deleted(harness: Harness) {
    let corrupted = json!({
        "value": "@@ not base64 @@",
        "metadata": {
            "timestamp": 1_000,
            "version": "1.0",
            "type": "object",
            "compressed": true,
            "encrypted": false,
            "codec": "zstd"
        }
    });
    harness
        .store
        .write_raw("progress", &corrupted.to_string())
        .expect("raw write");

    assert_eq!(harness.store.get("progress", json!({})), json!({}));
    assert!(harness.store.read_raw("progress").is_none());
    assert_eq!(
        harness.sink.take(),
        vec![TelemetryEvent::CorruptionDetected {
            key: "progress".to_owned(),
            recovered: false,
        }]
    );
}

fn compressed_record(value: &str, codec: &str) -> String {
    json!({
        "value": value,
        "metadata": {
            "timestamp": 1_000,
            "version": "1.0",
            "type": "string",
            "compressed": true,
            "encrypted": false,
            "codec": codec
        }
    })
    .to_string()
}

#[rstest]
fn oversized_run_length_payload_is_discarded(harness: Harness) {
    harness
        .store
        .write_raw("notes", &compressed_record("99999999999999a", "rle"))
        .expect("raw write");

    assert_eq!(harness.store.get("notes", json!("none")), json!("none"));
    assert!(harness.store.read_raw("notes").is_none());
    assert_eq!(
        harness.sink.take(),
        vec![TelemetryEvent::CorruptionDetected {
            key: "notes".to_owned(),
            recovered: false,
        }]
    );
}

#[test]
fn decoded_size_limit_applies_to_zstd_payloads() {
    let harness = harness_with(
        MemoryBackend::new(),
        StoreOptions {
            max_decoded_len: 64,
            ..StoreOptions::default()
        },
    );
    let inflated = CompressionCodec::Zstd
        .compress(&format!("\"{}\"", "a".repeat(4096)))
        .expect("compress");
    harness
        .store
        .write_raw("notes", &compressed_record(&inflated, "zstd"))
        .expect("raw write");

    assert_eq!(harness.store.get_value("notes"), None);
    assert!(harness.store.read_raw("notes").is_none());
}

#[test]
fn values_sealed_with_a_missing_key_are_kept() {
    let keyed = || StoreOptions {
        encryption_key: Some(EncryptionKey::from_bytes([7; 32])),
        ..StoreOptions::default()
    };
    let writer = harness_with(MemoryBackend::new(), keyed());
    writer
        .store
        .set("password", &json!("hunter2"), SetOptions::default())
        .expect("set");
    let sealed = writer.store.read_raw("password").expect("sealed record");

    let keyless = harness_with(MemoryBackend::new(), StoreOptions::default());
    keyless.store.write_raw("password", &sealed).expect("raw write");

    assert_eq!(keyless.store.get_value("password"), None);
    assert_eq!(keyless.store.read_raw("password"), Some(sealed.clone()));
    assert!(keyless.sink.take().is_empty());

    let rekeyed = harness_with(MemoryBackend::new(), keyed());
    rekeyed.store.write_raw("password", &sealed).expect("raw write");
    assert_eq!(rekeyed.store.get_value("password"), Some(json!("hunter2")));
}

#[rstest]
fn malformed_envelope_is_treated_as_corruption(harness: Harness) {
    harness
        .store
        .write_raw("prefs", "{not json")
        .expect("raw write");

    assert_eq!(harness.store.get_value("prefs"), None);
    assert!(harness.store.read_raw("prefs").is_none());
}

#[rstest]
fn corruption_recovers_from_backup(harness: Harness) {
    harness
        .store
        .set("prefs", &json!({"theme": "dark"}), SetOptions::default())
        .expect("set");
    assert_eq!(harness.store.create_backup().expect("backup"), 1);
    harness
        .store
        .write_raw("prefs", "garbage")
        .expect("raw write");
    let _ignored = harness.sink.take();

    assert_eq!(
        harness.store.get_value("prefs"),
        Some(json!({"theme": "dark"}))
    );
    assert_eq!(
        harness.sink.take(),
        vec![TelemetryEvent::CorruptionDetected {
            key: "prefs".to_owned(),
            recovered: true,
        }]
    );
    assert!(harness.store.read_raw("prefs").is_some(), "restored copy should be written back");
}

#[rstest]
fn restore_backup_rewrites_every_entry(harness: Harness) {
    harness.store.set("a", &1, SetOptions::default()).expect("set");
    harness.store.set("b", &2, SetOptions::default()).expect("set");
    harness.store.create_backup().expect("backup");
    harness.store.remove("a").expect("remove");
    harness.store.set("b", &20, SetOptions::default()).expect("set");

    assert_eq!(harness.store.restore_backup().expect("restore"), 2);
    assert_eq!(harness.store.get("a", 0), 1);
    assert_eq!(harness.store.get("b", 0), 2);
}

#[test]
fn clear_only_touches_the_namespace() {
    let backend = MemoryBackend::new();
    backend.write("foreign_key", "kept").expect("write");
    let harness = harness_with(backend, StoreOptions::default());
    harness.store.set("a", &1, SetOptions::default()).expect("set");
    harness.store.set("b", &2, SetOptions::default()).expect("set");

    assert_eq!(harness.store.clear().expect("clear"), 2);
    assert!(harness.store.keys().expect("keys").is_empty());
    assert_eq!(harness.store.get_value("a"), None);
}

#[rstest]
fn export_and_import_move_logical_values(harness: Harness) {
    harness.store.set("a", &json!([1, 2]), SetOptions::default()).expect("set");
    harness.store.set("b", &json!("two"), SetOptions::default()).expect("set");
    harness.store.create_backup().expect("backup");

    let exported = harness.store.export().expect("export");
    let target = harness_with(MemoryBackend::new(), StoreOptions::default());
    target.store.import(&exported).expect("import");

    let expected: BTreeMap<String, Value> = [
        ("a".to_owned(), json!([1, 2])),
        ("b".to_owned(), json!("two")),
    ]
    .into_iter()
    .collect();
    assert_eq!(exported, expected);
    assert_eq!(target.store.export().expect("export"), expected);
}

struct UnavailableBackend;

impl StorageBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn read(&self, _key: &str) -> Result<Option<String>, PersistenceError> {
        Err(PersistenceError::Unavailable {
            message: "private mode".to_owned(),
        })
    }

    fn write(&self, _key: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable {
            message: "private mode".to_owned(),
        })
    }

    fn delete(&self, _key: &str) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, PersistenceError> {
        Ok(Vec::new())
    }

    fn usage(&self) -> Result<StorageUsage, PersistenceError> {
        Ok(StorageUsage::default())
    }
}

#[test]
fn unavailable_backend_falls_back_to_memory() {
    let sink = Arc::new(RecordingSink::default());
    let store = DurableStore::with_fallback(
        vec![Box::new(UnavailableBackend)],
        StoreOptions::default(),
        Arc::new(ManualClock::new(0)),
        sink.clone(),
    );

    store.set("prefs", &json!(true), SetOptions::default()).expect("set");

    assert_eq!(store.backend_name(), "memory");
    assert_eq!(store.get_value("prefs"), Some(json!(true)));
    assert_eq!(
        sink.take().first(),
        Some(&TelemetryEvent::StorageFallback {
            backend: "memory".to_owned()
        })
    );
}
