//! `HttpClient` on top of reqwest.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ProgressCallback, TransferProgress,
};
use futures_util::StreamExt;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("mixtape-core/", env!("CARGO_PKG_VERSION"));

/// Pooled reqwest client.
///
/// JSON calls get `default_timeout` unless the request sets its own. File
/// transfers are only bounded by the connect timeout, since an audio file on
/// a slow link can take minutes.
pub struct ReqwestHttpClient {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(default_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });
        Self::with_client(client, default_timeout)
    }

    pub fn with_client(client: Client, default_timeout: Duration) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    fn prepare(&self, request: HttpRequest, fallback_timeout: Option<Duration>) -> RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = request
            .headers
            .into_iter()
            .fold(self.client.request(method, &request.url), |builder, (name, value)| {
                builder.header(name, value)
            });
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        match request.timeout.or(fallback_timeout) {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Failures before any response arrived count as network errors, which
/// callers may retry.
fn send_error(e: reqwest::Error) -> BridgeError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        BridgeError::Network(e.to_string())
    } else {
        BridgeError::OperationFailed(e.to_string())
    }
}

/// `Range` header for a resumed transfer.
fn range_header(resume_from: u64) -> Option<String> {
    (resume_from > 0).then(|| format!("bytes={resume_from}-"))
}

async fn open_destination(destination: &Path, append: bool) -> Result<File> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file = if append {
        OpenOptions::new().append(true).open(destination).await?
    } else {
        File::create(destination).await?
    };
    Ok(file)
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(url = %request.url, "HTTP request");
        let response = self
            .prepare(request, Some(self.default_timeout))
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Interrupted(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download_to_file(
        &self,
        mut request: HttpRequest,
        destination: &Path,
        resume_from: u64,
        on_progress: ProgressCallback,
    ) -> Result<u64> {
        if let Some(range) = range_header(resume_from) {
            request = request.header("Range", range);
        }

        let response = self.prepare(request, None).send().await.map_err(send_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let resumed = resume_from > 0 && status == StatusCode::PARTIAL_CONTENT;
        if resume_from > 0 && !resumed {
            info!(path = ?destination, "Range ignored by server, restarting transfer");
        }

        let mut file = open_destination(destination, resumed).await?;
        let mut progress = TransferProgress {
            bytes_written: if resumed { resume_from } else { 0 },
            total_bytes: None,
        };
        progress.total_bytes = response
            .content_length()
            .map(|remaining| remaining + progress.bytes_written);
        on_progress(progress);

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| BridgeError::Interrupted(e.to_string()))?;
            file.write_all(&chunk).await?;
            progress.bytes_written += chunk.len() as u64;
            on_progress(progress);
        }
        file.flush().await?;

        debug!(path = ?destination, bytes = progress.bytes_written, "Transfer finished");
        Ok(progress.bytes_written)
    }
}
