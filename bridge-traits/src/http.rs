//! HTTP capability.
//!
//! Requests are plain values built with [`HttpRequest`]; the host decides how
//! they go over the wire. Two kinds of call exist:
//!
//! - [`HttpClient::execute`] for small JSON exchanges, one attempt each. Retry
//!   and backoff belong to the caller, which knows which failures are worth
//!   repeating ([`RetryPolicy`] describes the schedule).
//! - [`HttpClient::download_to_file`] for audio transfers, streamed to disk
//!   with progress callbacks and `Range` resume.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Overall deadline. `None` means no deadline, which is what long
    /// transfers want.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| BridgeError::OperationFailed(format!("cannot encode request: {e}")))?;
        Ok(self
            .header("Content-Type", "application/json")
            .body(Bytes::from(encoded)))
    }

    pub fn body(self, body: Bytes) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }

    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }
}

/// Fully buffered response. Non-2xx statuses are returned as responses, not
/// errors.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::OperationFailed(format!("cannot decode response: {e}")))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Header lookup ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Exponential backoff schedule for callers that retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Pause before retry number `attempt` (1-based): `base * 2^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes in the destination file so far, resumed bytes included.
    pub bytes_written: u64,
    /// Final size, when the server announced one.
    pub total_bytes: Option<u64>,
}

/// Invoked after every chunk written by [`HttpClient::download_to_file`].
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request` once and buffer the whole response.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Network`] when no response arrived (connect failure,
    /// timeout). A response with any status is `Ok`.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Stream the response body of `request` into `destination`.
    ///
    /// With a non-zero `resume_from` the request carries
    /// `Range: bytes=<resume_from>-` and a `206` reply is appended to the
    /// existing file. A `200` reply means the server ignored the range: the
    /// file is truncated and rewritten from the start.
    ///
    /// Returns the final size of `destination`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Http`] when the server answers with a non-2xx status
    /// - [`BridgeError::Interrupted`] when the body stream breaks mid-transfer
    /// - [`BridgeError::Io`] when the destination cannot be written
    async fn download_to_file(
        &self,
        request: HttpRequest,
        destination: &Path,
        resume_from: u64,
        on_progress: ProgressCallback,
    ) -> Result<u64>;
}
