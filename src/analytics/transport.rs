//! Delivery of event batches to a remote collection endpoint.
//!
//! The [`BatchTransport`] trait keeps the flusher independent of HTTP so
//! tests can substitute mocks. [`HttpTransport`] posts JSON with `reqwest`,
//! compresses large bodies with zstd, and bounds each exchange with a
//! timeout. Dropping the timed-out future aborts the request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::event::Event;
use super::settings::{Instructions, TrackerSettings};

/// Header carrying the batch's session identifier.
pub const SESSION_HEADER: &str = "X-Session-ID";
/// Payload format version sent in batch metadata.
pub const PAYLOAD_VERSION: &str = env!("CARGO_PKG_VERSION");

const ZSTD_LEVEL: i32 = 3;
const ERROR_BODY_LIMIT: usize = 160;

/// Errors raised while delivering a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The HTTP client could not be built.
    #[error("failed to configure HTTP client: {message}")]
    Configuration {
        /// Error details.
        message: String,
    },
    /// The batch could not be serialised.
    #[error("failed to encode batch: {message}")]
    Encode {
        /// Error details.
        message: String,
    },
    /// The exchange did not finish in time.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },
    /// The request could not be sent or the response not read.
    #[error("network request failed: {message}")]
    Network {
        /// Error details.
        message: String,
    },
    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        message: String,
    },
}

/// A batch ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingBatch {
    /// Session the batch belongs to.
    pub session_id: String,
    /// Send time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Events in insertion order.
    pub events: Vec<Event>,
}

/// Parsed endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransportResponse {
    /// Soft directives, when the endpoint sent any.
    #[serde(default)]
    pub instructions: Option<Instructions>,
}

/// Delivers batches to a remote sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Sends one batch.
    async fn send(&self, batch: &OutgoingBatch) -> Result<TransportResponse, TransportError>;
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Collection endpoint.
    pub endpoint: Url,
    /// Bearer token, when the endpoint requires one.
    pub auth_token: Option<String>,
    /// Upper bound on one exchange.
    pub timeout: Duration,
    /// Body size above which the body is zstd compressed.
    pub compression_threshold: usize,
}

impl HttpTransportConfig {
    /// Extracts transport settings, or `None` when no endpoint is set.
    #[must_use]
    pub fn from_settings(settings: &TrackerSettings) -> Option<Self> {
        settings.endpoint.as_ref().map(|endpoint| Self {
            endpoint: endpoint.clone(),
            auth_token: settings.auth_token.clone(),
            timeout: settings.request_timeout,
            compression_threshold: settings.compression_threshold,
        })
    }
}

/// `reqwest` implementation of [`BatchTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    events: &'a [Event],
    metadata: WireMetadata<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata<'a> {
    session_id: &'a str,
    timestamp: u64,
    version: &'static str,
    batch_size: usize,
    compressed: bool,
}

struct EncodedBody {
    bytes: Vec<u8>,
    compressed: bool,
}

impl HttpTransport {
    /// Builds a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] when the HTTP client
    /// cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|error| TransportError::Configuration {
                message: error.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn encode(&self, batch: &OutgoingBatch) -> Result<EncodedBody, TransportError> {
        let plain = serialise_payload(batch, false)?;
        if plain.len() <= self.config.compression_threshold {
            return Ok(EncodedBody {
                bytes: plain,
                compressed: false,
            });
        }

        let marked = serialise_payload(batch, true)?;
        match zstd::bulk::compress(&marked, ZSTD_LEVEL) {
            Ok(bytes) => Ok(EncodedBody {
                bytes,
                compressed: true,
            }),
            Err(error) => {
                tracing::warn!("sending batch uncompressed: {error}");
                Ok(EncodedBody {
                    bytes: plain,
                    compressed: false,
                })
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

fn serialise_payload(batch: &OutgoingBatch, compressed: bool) -> Result<Vec<u8>, TransportError> {
    let payload = WirePayload {
        events: &batch.events,
        metadata: WireMetadata {
            session_id: &batch.session_id,
            timestamp: batch.timestamp,
            version: PAYLOAD_VERSION,
            batch_size: batch.events.len(),
            compressed,
        },
    };
    serde_json::to_vec(&payload).map_err(|error| TransportError::Encode {
        message: error.to_string(),
    })
}

fn network_error(error: &reqwest::Error) -> TransportError {
    TransportError::Network {
        message: error.to_string(),
    }
}

fn truncate_for_message(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

fn parse_response(body: &str) -> TransportResponse {
    if body.trim().is_empty() {
        return TransportResponse::default();
    }
    serde_json::from_str(body).unwrap_or_else(|error| {
        tracing::warn!("ignoring unparseable endpoint response: {error}");
        TransportResponse::default()
    })
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send(&self, batch: &OutgoingBatch) -> Result<TransportResponse, TransportError> {
        let body = self.encode(batch)?;

        let mut request = self
            .client
            .post(self.config.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(SESSION_HEADER, batch.session_id.as_str());
        if body.compressed {
            request = request.header(CONTENT_ENCODING, "zstd");
        }
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let exchange = async move {
            let response = request
                .body(body.bytes)
                .send()
                .await
                .map_err(|error| network_error(&error))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|error| network_error(&error))?;
            Ok::<_, TransportError>((status, text))
        };

        let (status, text) = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_elapsed| TransportError::Timeout {
                timeout_ms: self.timeout_ms(),
            })??;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: truncate_for_message(&text),
            });
        }
        Ok(parse_response(&text))
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
