//! Compression providers for stored payloads.
//!
//! Providers are tried in order: zstd first, then a dictionary-free
//! run-length encoding that needs no native library. Both are exact inverses
//! of their decoders for every input string.

use std::io::Read;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::error::CodecError;

const ZSTD_LEVEL: i32 = 3;
const RLE_ESCAPE: char = '\\';

/// Identifies the provider that produced a compressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionCodec {
    /// zstd frame, base64 encoded.
    Zstd,
    /// Run-length encoding with `\` escapes.
    Rle,
}

impl CompressionCodec {
    /// Compresses `input` with this codec.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the codec fails.
    pub fn compress(self, input: &str) -> Result<String, CodecError> {
        match self {
            Self::Zstd => zstd_compress(input),
            Self::Rle => Ok(rle_compress(input)),
        }
    }

    /// Restores the original string from `payload`, refusing output longer
    /// than `max_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the payload is malformed or
    /// inflates past `max_len`.
    pub fn decompress(self, payload: &str, max_len: usize) -> Result<String, CodecError> {
        match self {
            Self::Zstd => zstd_decompress(payload, max_len),
            Self::Rle => rle_decompress(payload, max_len),
        }
    }

    /// Best-effort check that `payload` looks like output of this codec.
    ///
    /// A `true` result does not guarantee the payload decodes, and false
    /// negatives are possible for hand-edited data.
    #[must_use]
    pub fn looks_valid(self, payload: &str) -> bool {
        if payload.is_empty() {
            return false;
        }
        match self {
            Self::Zstd => payload
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'/' | b'=')),
            // serde_json escapes every C0 control character.
            Self::Rle => !payload.chars().any(|character| character < ' '),
        }
    }

    /// Provider name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Rle => "rle",
        }
    }
}

/// Ordered list of compression providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressors {
    providers: Vec<CompressionCodec>,
}

impl Default for Compressors {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Compressors {
    /// Builds the provider list; `native` controls whether zstd is tried.
    #[must_use]
    pub fn new(native: bool) -> Self {
        let providers = if native {
            vec![CompressionCodec::Zstd, CompressionCodec::Rle]
        } else {
            vec![CompressionCodec::Rle]
        };
        Self { providers }
    }

    /// Compresses with the first provider that succeeds.
    ///
    /// # Errors
    ///
    /// Returns the last provider's error when every provider fails.
    pub fn compress(&self, input: &str) -> Result<(CompressionCodec, String), CodecError> {
        let mut last_error = CodecError::Unavailable {
            provider: "compression",
            message: "no providers configured".to_owned(),
        };
        for codec in &self.providers {
            match codec.compress(input) {
                Ok(payload) => return Ok((*codec, payload)),
                Err(error) => {
                    tracing::debug!("compression provider {} failed: {error}", codec.name());
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }
}

fn zstd_compress(input: &str) -> Result<String, CodecError> {
    zstd::bulk::compress(input.as_bytes(), ZSTD_LEVEL)
        .map(|bytes| STANDARD.encode(bytes))
        .map_err(|error| CodecError::Encode {
            provider: "zstd",
            message: error.to_string(),
        })
}

fn zstd_decompress(payload: &str, max_len: usize) -> Result<String, CodecError> {
    let decode_error = |message: String| CodecError::Decode {
        provider: "zstd",
        message,
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(|error| decode_error(error.to_string()))?;
    let decoder = zstd::stream::read::Decoder::new(bytes.as_slice())
        .map_err(|error| decode_error(error.to_string()))?;
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    let mut raw = Vec::new();
    decoder
        .take(limit)
        .read_to_end(&mut raw)
        .map_err(|error| decode_error(error.to_string()))?;
    if raw.len() > max_len {
        return Err(decode_error(format!("output exceeds {max_len} bytes")));
    }
    String::from_utf8(raw).map_err(|error| decode_error(error.to_string()))
}

/// Run-length encodes `input`.
///
/// Runs longer than one character become `<count><char>`. Digits and the
/// escape character itself are always written as `\<char>` so counts stay
/// unambiguous.
#[must_use]
pub fn rle_compress(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(current) = chars.next() {
        let mut run: usize = 1;
        while chars.peek() == Some(&current) {
            chars.next();
            run = run.saturating_add(1);
        }
        if run > 1 {
            output.push_str(&run.to_string());
        }
        if current.is_ascii_digit() || current == RLE_ESCAPE {
            output.push(RLE_ESCAPE);
        }
        output.push(current);
    }

    output
}

/// Inverts [`rle_compress`], refusing output longer than `max_len` bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for dangling counts or escapes, zero or
/// one-length runs, counts that overflow, and output past `max_len`.
pub fn rle_decompress(payload: &str, max_len: usize) -> Result<String, CodecError> {
    let decode_error = |message: &str| CodecError::Decode {
        provider: "rle",
        message: message.to_owned(),
    };

    let mut output = String::with_capacity(payload.len());
    let mut count: Option<usize> = None;
    let mut chars = payload.chars();

    while let Some(current) = chars.next() {
        if let Some(digit) = current.to_digit(10) {
            let digit_value = usize::try_from(digit).map_err(|_| decode_error("bad digit"))?;
            let next = count
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|value| value.checked_add(digit_value))
                .ok_or_else(|| decode_error("run length overflow"))?;
            count = Some(next);
            continue;
        }

        let literal = if current == RLE_ESCAPE {
            chars.next().ok_or_else(|| decode_error("dangling escape"))?
        } else {
            current
        };

        let run = match count.take() {
            None => 1,
            Some(run) if run > 1 => run,
            Some(_) => return Err(decode_error("run length must exceed one")),
        };
        let fits = literal
            .len_utf8()
            .checked_mul(run)
            .and_then(|bytes| bytes.checked_add(output.len()))
            .is_some_and(|total| total <= max_len);
        if !fits {
            return Err(decode_error("output exceeds the decoded size limit"));
        }
        output.extend(std::iter::repeat_n(literal, run));
    }

    if count.is_some() {
        return Err(decode_error("dangling run length"));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{CompressionCodec, Compressors, rle_compress, rle_decompress};
    use crate::persistence::error::CodecError;

    const LIMIT: usize = 1 << 20;

    #[rstest]
    #[case::plain("abc", "abc")]
    #[case::runs("aaabcc", "3ab2c")]
    #[case::digits("1112", "3\\1\\2")]
    #[case::escape_char("\\\\x", "2\\\\x")]
    #[case::unicode("ééé", "3é")]
    #[case::empty("", "")]
    fn rle_encodes_runs(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(rle_compress(input), expected);
        assert_eq!(rle_decompress(expected, LIMIT).expect("decode"), input);
    }

    #[rstest]
    #[case::dangling_count("3")]
    #[case::dangling_escape("ab\\")]
    #[case::run_of_one("1a")]
    #[case::run_of_zero("0a")]
    fn rle_rejects_malformed_payloads(#[case] payload: &str) {
        assert!(rle_decompress(payload, LIMIT).is_err(), "{payload:?} should fail");
    }

    #[test]
    fn zstd_output_passes_validity_heuristic() {
        let payload = CompressionCodec::Zstd
            .compress(&"simulation ".repeat(200))
            .expect("compress");

        assert!(CompressionCodec::Zstd.looks_valid(&payload));
        assert!(!CompressionCodec::Zstd.looks_valid("not base64 !"));
        assert!(!CompressionCodec::Zstd.looks_valid(""));
    }

    #[test]
    fn rle_heuristic_rejects_raw_control_characters() {
        assert!(CompressionCodec::Rle.looks_valid(&rle_compress("\"caf\u{e9} \u{7f}\"")));
        assert!(!CompressionCodec::Rle.looks_valid("3a\nb"));
        assert!(!CompressionCodec::Rle.looks_valid(""));
    }

    #[test]
    fn zstd_rejects_garbage() {
        assert!(CompressionCodec::Zstd.decompress("AAAA", LIMIT).is_err());
    }

    #[test]
    fn rle_refuses_runs_past_the_limit() {
        let result = rle_decompress("99999999999999a", LIMIT);

        assert!(
            matches!(result, Err(CodecError::Decode { provider: "rle", .. })),
            "unexpected result: {result:?}"
        );
        assert_eq!(rle_decompress("4z", 4).expect("decode"), "zzzz");
        assert!(rle_decompress("5z", 4).is_err());
    }

    #[test]
    fn zstd_refuses_output_past_the_limit() {
        let payload = CompressionCodec::Zstd
            .compress(&"a".repeat(4096))
            .expect("compress");

        assert!(CompressionCodec::Zstd.decompress(&payload, 4095).is_err());
        assert_eq!(
            CompressionCodec::Zstd
                .decompress(&payload, 4096)
                .expect("decode")
                .len(),
            4096
        );
    }

    #[test]
    fn compressors_without_native_use_rle() {
        let (codec, payload) = Compressors::new(false).compress("zzzz").expect("compress");

        assert_eq!(codec, CompressionCodec::Rle);
        assert_eq!(payload, "4z");
    }

    proptest! {
        #[test]
        fn rle_round_trips_any_string(input in any::<String>()) {
            prop_assert_eq!(rle_decompress(&rle_compress(&input), LIMIT).expect("decode"), input);
        }

        #[test]
        fn zstd_round_trips_any_string(input in any::<String>()) {
            let payload = CompressionCodec::Zstd.compress(&input).expect("compress");
            prop_assert_eq!(CompressionCodec::Zstd.decompress(&payload, LIMIT).expect("decode"), input);
        }

        #[test]
        fn rle_round_trips_repetitive_strings(input in "[a-c0-2\\\\]{0,64}") {
            prop_assert_eq!(rle_decompress(&rle_compress(&input), LIMIT).expect("decode"), input);
        }
    }
}
