//! Tests for tracker and store settings validation.

use std::time::Duration;

use rstest::rstest;

use crate::SimtrackConfig;
use crate::error::SimtrackError;
use crate::persistence::EncryptionKey;

#[rstest]
fn defaults_produce_valid_settings() {
    let settings = SimtrackConfig::default()
        .tracker_settings()
        .expect("defaults should validate");

    assert_eq!(settings.flush_interval, Duration::from_secs(30));
    assert_eq!(settings.session.history_limit, 50);
    assert!(settings.endpoint.is_none());
}

#[rstest]
fn settings_carry_configured_values() {
    let config = SimtrackConfig {
        endpoint: Some("https://collector.example/events".to_owned()),
        auth_token: Some("token".to_owned()),
        batch_size: 10,
        privacy_mode: true,
        session_ttl_ms: 1_000,
        ..SimtrackConfig::default()
    };

    let settings = config.tracker_settings().expect("should validate");

    assert_eq!(
        settings.endpoint.map(String::from).as_deref(),
        Some("https://collector.example/events")
    );
    assert_eq!(settings.auth_token.as_deref(), Some("token"));
    assert_eq!(settings.batch_size, 10);
    assert!(settings.privacy_mode);
    assert_eq!(settings.session.session_ttl_ms, 1_000);
}

#[rstest]
#[case::not_a_url(SimtrackConfig { endpoint: Some("not a url".to_owned()), ..SimtrackConfig::default() })]
#[case::wrong_scheme(SimtrackConfig { endpoint: Some("ftp://collector.example".to_owned()), ..SimtrackConfig::default() })]
#[case::zero_batch(SimtrackConfig { batch_size: 0, ..SimtrackConfig::default() })]
#[case::trim_above_max(SimtrackConfig { queue_trim_size: 2_000, ..SimtrackConfig::default() })]
#[case::inverted_bounds(SimtrackConfig { min_flush_interval_ms: 10_000, max_flush_interval_ms: 5_000, ..SimtrackConfig::default() })]
#[case::interval_below_min(SimtrackConfig { flush_interval_ms: 1_000, ..SimtrackConfig::default() })]
#[case::interval_above_max(SimtrackConfig { flush_interval_ms: 600_000, ..SimtrackConfig::default() })]
fn inconsistent_settings_are_rejected(#[case] config: SimtrackConfig) {
    let result = config.tracker_settings();

    assert!(
        matches!(result, Err(SimtrackError::Configuration { .. })),
        "expected a configuration error, got {result:?}"
    );
}

#[rstest]
fn store_options_accept_a_valid_key() {
    let key = EncryptionKey::generate();
    let config = SimtrackConfig {
        encryption_key: Some(key.to_base64()),
        storage_prefix: "app_".to_owned(),
        ..SimtrackConfig::default()
    };

    let options = config.store_options().expect("should validate");

    assert_eq!(options.encryption_key, Some(key));
    assert_eq!(options.prefix, "app_");
}

#[rstest]
#[case::short_key(SimtrackConfig { encryption_key: Some("c2hvcnQ=".to_owned()), ..SimtrackConfig::default() })]
#[case::not_base64(SimtrackConfig { encryption_key: Some("***".to_owned()), ..SimtrackConfig::default() })]
#[case::blank_prefix(SimtrackConfig { storage_prefix: "  ".to_owned(), ..SimtrackConfig::default() })]
fn invalid_store_options_are_rejected(#[case] config: SimtrackConfig) {
    assert!(matches!(
        config.store_options(),
        Err(SimtrackError::Configuration { .. })
    ));
}
