//! Dropbox API connector implementation
//!
//! Implements the `StorageProvider` trait for the Dropbox HTTP API v2.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{Credentials, RemoteFile, StorageProvider, UploadMode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{DropboxError, Result};
use crate::header::http_header_safe_json;
use crate::types::{
    ApiErrorBody, BasicAccount, DropboxEntry, GetAccountBatchArg, ListFolderArg,
    ListFolderContinueArg, ListFolderResponse, PathArg, UploadArg, WriteMode,
};

/// RPC endpoints (JSON in, JSON out)
pub const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com/2";

/// Content endpoints (arguments in the `Dropbox-API-Arg` header)
pub const DROPBOX_CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// Header carrying the JSON argument of content endpoints
pub const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Timeout for RPC calls; streamed downloads are not bounded by it
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Connector configuration
#[derive(Debug, Clone)]
pub struct DropboxConfig {
    pub api_base: String,
    pub content_base: String,
    /// Backoff applied to 429, 5xx and network failures
    pub retry_policy: RetryPolicy,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            api_base: DROPBOX_API_BASE.to_string(),
            content_base: DROPBOX_CONTENT_BASE.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Dropbox API connector
///
/// Credentials are supplied per call, so one connector serves every account
/// the host signs in with.
///
/// # Example
///
/// ```ignore
/// use provider_dropbox::DropboxConnector;
/// use bridge_traits::storage::{Credentials, StorageProvider};
///
/// let connector = DropboxConnector::new(http_client);
/// let entries = connector
///     .list_folder(&Credentials::new(token), "/playlists")
///     .await?;
/// ```
pub struct DropboxConnector {
    http_client: Arc<dyn HttpClient>,
    config: DropboxConfig,
}

impl DropboxConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_config(http_client, DropboxConfig::default())
    }

    pub fn with_config(http_client: Arc<dyn HttpClient>, config: DropboxConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn rpc_request<T: Serialize>(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        arg: &T,
    ) -> Result<HttpRequest> {
        Ok(HttpRequest::new(
            HttpMethod::Post,
            format!("{}{}", self.config.api_base, endpoint),
        )
        .bearer_token(credentials.access_token.as_str())
        .timeout(RPC_TIMEOUT)
        .json(arg)?)
    }

    fn content_request<T: Serialize>(
        &self,
        credentials: &Credentials,
        endpoint: &str,
        arg: &T,
    ) -> Result<HttpRequest> {
        Ok(HttpRequest::new(
            HttpMethod::Post,
            format!("{}{}", self.config.content_base, endpoint),
        )
        .bearer_token(credentials.access_token.as_str())
        .header(API_ARG_HEADER, http_header_safe_json(arg)?))
    }

    /// Parse RFC 3339 timestamp
    fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(rfc3339)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Convert DropboxEntry to RemoteFile
    fn convert_entry(entry: DropboxEntry) -> RemoteFile {
        RemoteFile {
            tag: entry.tag,
            name: entry.name,
            id: entry.id,
            path_lower: entry.path_lower,
            path_display: entry.path_display,
            rev: entry.rev,
            server_modified: entry
                .server_modified
                .as_deref()
                .and_then(Self::parse_timestamp),
            size: entry.size,
            modified_by: entry.sharing_info.and_then(|info| info.modified_by),
        }
    }

    /// Map a non-success response to a provider error.
    fn classify_failure(response: &HttpResponse, path: &str) -> DropboxError {
        let status = response.status;
        let body = String::from_utf8_lossy(&response.body).to_string();

        match status {
            401 => DropboxError::AuthenticationFailed(body),
            409 => {
                let summary = serde_json::from_slice::<ApiErrorBody>(&response.body)
                    .map(|e| e.error_summary)
                    .unwrap_or(body);
                if summary.contains("not_found") {
                    DropboxError::NotFound {
                        path: path.to_string(),
                    }
                } else {
                    DropboxError::ApiError {
                        status_code: status,
                        message: summary,
                    }
                }
            }
            429 => DropboxError::RateLimitExceeded {
                retry_after_seconds: retry_after(response).unwrap_or(0),
            },
            _ => DropboxError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }

    /// Execute API request with retry logic
    ///
    /// Retries with exponential backoff on 429, 5xx and network failures.
    /// Every other failure is returned on the first attempt.
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest, path: &str) -> Result<HttpResponse> {
        let policy = &self.config.retry_policy;
        let mut attempt = 0;

        loop {
            let retryable = match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let error = Self::classify_failure(&response, path);
                    if response.status != 429 && !response.is_server_error() {
                        warn!(status = response.status, error = %error, "API request failed");
                        return Err(error);
                    }
                    error
                }
                Err(BridgeError::Network(message)) => {
                    DropboxError::BridgeError(BridgeError::Network(message))
                }
                Err(e) => return Err(e.into()),
            };

            attempt += 1;
            if attempt >= policy.max_attempts {
                warn!(
                    attempts = attempt,
                    error = %retryable,
                    "API request failed after retries"
                );
                return Err(retryable);
            }

            let delay = match &retryable {
                DropboxError::RateLimitExceeded {
                    retry_after_seconds,
                } if *retry_after_seconds > 0 => {
                    Duration::from_secs(*retry_after_seconds).min(policy.max_delay)
                }
                _ => policy.delay_for(attempt),
            };
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %retryable,
                "API request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| DropboxError::ParseError(e.to_string()))
    }
}

fn retry_after(response: &HttpResponse) -> Option<u64> {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse().ok())
}

#[async_trait]
impl StorageProvider for DropboxConnector {
    #[instrument(skip(self, credentials))]
    async fn list_folder(&self, credentials: &Credentials, path: &str) -> BridgeResult<Vec<RemoteFile>> {
        let request = self.rpc_request(
            credentials,
            "/files/list_folder",
            &ListFolderArg {
                path,
                recursive: false,
                include_deleted: false,
            },
        )?;
        let response = self.execute_with_retry(request, path).await?;
        let mut page: ListFolderResponse = Self::parse(&response)?;

        let mut entries: Vec<RemoteFile> =
            page.entries.drain(..).map(Self::convert_entry).collect();
        let mut pages = 1;

        while page.has_more {
            let request = self.rpc_request(
                credentials,
                "/files/list_folder/continue",
                &ListFolderContinueArg {
                    cursor: &page.cursor,
                },
            )?;
            let response = self.execute_with_retry(request, path).await?;
            page = Self::parse(&response)?;
            entries.extend(page.entries.drain(..).map(Self::convert_entry));
            pages += 1;
        }

        info!(entries = entries.len(), pages, "Listed folder");
        Ok(entries)
    }

    #[instrument(skip(self, credentials))]
    async fn get_metadata(&self, credentials: &Credentials, path: &str) -> BridgeResult<RemoteFile> {
        let request = self.rpc_request(credentials, "/files/get_metadata", &PathArg { path })?;
        let response = self.execute_with_retry(request, path).await?;
        let entry: DropboxEntry = Self::parse(&response)?;
        Ok(Self::convert_entry(entry))
    }

    #[instrument(skip(self, credentials))]
    async fn download(&self, credentials: &Credentials, path: &str) -> BridgeResult<Bytes> {
        let request = self.download_request(credentials, path)?.timeout(RPC_TIMEOUT);
        let response = self.execute_with_retry(request, path).await?;
        debug!(bytes = response.body.len(), "Downloaded file");
        Ok(response.body)
    }

    fn download_request(&self, credentials: &Credentials, path: &str) -> BridgeResult<HttpRequest> {
        Ok(self.content_request(credentials, "/files/download", &PathArg { path })?)
    }

    #[instrument(skip(self, credentials, contents), fields(bytes = contents.len()))]
    async fn upload(
        &self,
        credentials: &Credentials,
        path: &str,
        contents: Bytes,
        mode: UploadMode,
    ) -> BridgeResult<RemoteFile> {
        let arg = UploadArg {
            path,
            mode: if mode.overwrite {
                WriteMode::Overwrite
            } else {
                WriteMode::Add
            },
            autorename: mode.autorename,
            mute: mode.mute,
        };
        let request = self
            .content_request(credentials, "/files/upload", &arg)?
            .header("Content-Type", "application/octet-stream")
            .timeout(RPC_TIMEOUT)
            .body(contents);

        let response = self.execute_with_retry(request, path).await?;
        let entry: DropboxEntry = Self::parse(&response)?;
        info!(rev = ?entry.rev, "Uploaded file");
        Ok(Self::convert_entry(entry))
    }

    #[instrument(skip(self, credentials), fields(count = account_ids.len()))]
    async fn account_display_names(
        &self,
        credentials: &Credentials,
        account_ids: &[String],
    ) -> BridgeResult<HashMap<String, String>> {
        let unique: Vec<String> = account_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let request = self.rpc_request(
            credentials,
            "/users/get_account_batch",
            &GetAccountBatchArg {
                account_ids: &unique,
            },
        )?;

        let response = match self.execute_with_retry(request, "").await {
            Ok(response) => response,
            Err(DropboxError::ApiError {
                status_code: 409,
                message,
            }) if message.contains("no_account") => {
                warn!(%message, "Unknown account in batch, names unavailable");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let accounts: Vec<BasicAccount> = Self::parse(&response)?;
        Ok(accounts
            .into_iter()
            .map(|account| (account.account_id, account.name.display_name))
            .collect())
    }
}
