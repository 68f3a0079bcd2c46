//! HTTP ingestion transport
//!
//! Each batch becomes one `POST` whose body is a JSON array of the batch's
//! payloads, in order. Payloads must therefore be JSON documents; use
//! [`batchline_core::JsonCodec`] at the enqueue boundary.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use batchline_core::{BatchTransport, TransportError};
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, warn};

/// Configuration for [`HttpTransport`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    /// Ingestion endpoint
    pub url: String,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl HttpTransportConfig {
    /// Create a configuration for an ingestion URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the overall request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Config(format!("header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Config(format!("header value for {}: {}", name.as_str(), e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Serialize a batch as a JSON array of its payload documents
///
/// Payload bytes are embedded verbatim once validated as JSON.
pub fn encode_batch(batch: &[Bytes]) -> Result<Vec<u8>, TransportError> {
    let documents = batch
        .iter()
        .enumerate()
        .map(|(position, payload)| {
            serde_json::from_slice::<Box<RawValue>>(payload).map_err(|e| {
                TransportError::Serialization(format!("payload {} is not JSON: {}", position, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    serde_json::to_vec(&documents).map_err(|e| TransportError::Serialization(e.to_string()))
}

/// Transport that POSTs batches to an HTTP ingestion endpoint
pub struct HttpTransport {
    client: Client,
    url: String,
    headers: RwLock<HeaderMap>,
}

impl HttpTransport {
    /// Build a transport from its configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Config`] for unusable headers or if the
    /// HTTP client cannot be constructed.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let headers = header_map(&config.headers)?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url,
            headers: RwLock::new(headers),
        })
    }

    /// Ingestion URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replace the extra headers used from the next request on
    ///
    /// A batch already in flight keeps the headers it was sent with.
    pub fn set_headers(&self, headers: &BTreeMap<String, String>) -> Result<(), TransportError> {
        let map = header_map(headers)?;
        *self.headers.write() = map;
        Ok(())
    }

    /// Current extra headers
    pub fn headers(&self) -> HeaderMap {
        self.headers.read().clone()
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn send_batch(&self, batch: Vec<Bytes>) -> Result<(), TransportError> {
        let body = encode_batch(&batch)?;
        let headers = self.headers();
        let started = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;

        if status == StatusCode::OK {
            debug!(batch_size = batch.len(), latency_ms, "Batch accepted");
            Ok(())
        } else {
            warn!(
                batch_size = batch.len(),
                status = status.as_u16(),
                latency_ms,
                "Batch not accepted"
            );
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
