//! Encryption providers for stored payloads.
//!
//! With a configured key, payloads are sealed with XChaCha20-Poly1305 using
//! a fresh random nonce per write. Without a key the store falls back to
//! plain base64 encoding, which offers **no confidentiality at all**; it
//! only keeps the record format uniform. [`Encryptor::is_secure`] tells
//! callers which one is active.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use super::error::CodecError;

const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;

/// Identifies how a stored payload was protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherKind {
    /// Authenticated encryption with XChaCha20-Poly1305.
    Xchacha20poly1305,
    /// Reversible base64 encoding. Not encryption.
    Base64Insecure,
}

/// A 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unavailable`] when the text is not base64 or
    /// does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        let invalid = |message: String| CodecError::Unavailable {
            provider: "xchacha20poly1305",
            message,
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|error| invalid(format!("key is not base64: {error}")))?;
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| invalid(format!("key must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self(key))
    }

    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

/// Seals and opens payloads with the strongest available provider.
#[derive(Debug)]
pub struct Encryptor {
    key: Option<EncryptionKey>,
    warned: AtomicBool,
}

impl Encryptor {
    /// Creates an encryptor; `None` selects the insecure fallback.
    #[must_use]
    pub const fn new(key: Option<EncryptionKey>) -> Self {
        Self {
            key,
            warned: AtomicBool::new(false),
        }
    }

    /// Returns `true` when payloads are actually encrypted.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.key.is_some()
    }

    /// Protects `plaintext`, returning the provider used and the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] when the cipher fails.
    pub fn seal(&self, plaintext: &str) -> Result<(CipherKind, String), CodecError> {
        let Some(key) = &self.key else {
            if !self.warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "no encryption key configured; sensitive values are only base64 encoded"
                );
            }
            return Ok((CipherKind::Base64Insecure, STANDARD.encode(plaintext)));
        };

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
        let mut nonce = [0_u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|error| CodecError::Encode {
                provider: "xchacha20poly1305",
                message: format!("{error:?}"),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok((CipherKind::Xchacha20poly1305, STANDARD.encode(sealed)))
    }

    /// Reverses [`Encryptor::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unavailable`] when the payload needs a key that
    /// is not configured, and [`CodecError::Decode`] when it fails to decode
    /// or authenticate.
    pub fn open(&self, kind: CipherKind, payload: &str) -> Result<String, CodecError> {
        match kind {
            CipherKind::Base64Insecure => {
                let bytes = STANDARD.decode(payload).map_err(|error| CodecError::Decode {
                    provider: "base64-insecure",
                    message: error.to_string(),
                })?;
                String::from_utf8(bytes).map_err(|error| CodecError::Decode {
                    provider: "base64-insecure",
                    message: error.to_string(),
                })
            }
            CipherKind::Xchacha20poly1305 => self.open_sealed(payload),
        }
    }

    fn open_sealed(&self, payload: &str) -> Result<String, CodecError> {
        let decode_error = |message: String| CodecError::Decode {
            provider: "xchacha20poly1305",
            message,
        };
        let Some(key) = &self.key else {
            return Err(CodecError::Unavailable {
                provider: "xchacha20poly1305",
                message: "payload is encrypted but no key is configured".to_owned(),
            });
        };

        let sealed = STANDARD
            .decode(payload)
            .map_err(|error| decode_error(error.to_string()))?;
        if sealed.len() < NONCE_LEN {
            return Err(decode_error("payload shorter than nonce".to_owned()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key.0));
        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| decode_error("authentication failed".to_owned()))?;
        String::from_utf8(plaintext).map_err(|error| decode_error(error.to_string()))
    }
}
