//! Payload redaction and timestamp coarsening.

use serde_json::{Map, Value};

/// Replacement written over redacted values.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// One hour in milliseconds.
pub const HOUR_MS: u64 = 3_600_000;

const DENYLIST: [&str; 13] = [
    "password",
    "token",
    "key",
    "secret",
    "auth",
    "email",
    "phone",
    "ssn",
    "credit_card",
    "api_key",
    "access_token",
    "refresh_token",
    "authorization",
];

/// Returns true when a field named `key` must be redacted.
///
/// Matching is exact and case-insensitive, so `Password` is redacted while
/// `password_hint` is not.
#[must_use]
pub fn is_denylisted(key: &str) -> bool {
    DENYLIST
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(key))
}

/// Redacts denylisted fields of `map`, descending into nested objects and
/// arrays.
pub fn sanitize_map(map: &mut Map<String, Value>) {
    for (key, value) in map.iter_mut() {
        if is_denylisted(key) {
            *value = Value::String(REDACTION_MARKER.to_owned());
        } else {
            sanitize_value(value);
        }
    }
}

/// Redacts denylisted fields anywhere inside `value`.
pub fn sanitize_value(value: &mut Value) {
    match value {
        Value::Object(map) => sanitize_map(map),
        Value::Array(items) => items.iter_mut().for_each(sanitize_value),
        _ => {}
    }
}

/// Floors a millisecond timestamp to the start of its hour.
#[must_use]
pub const fn floor_to_hour(timestamp: u64) -> u64 {
    timestamp.saturating_sub(timestamp.rem_euclid(HOUR_MS))
}
