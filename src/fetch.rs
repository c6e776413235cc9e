//! Network fetching
//!
//! [`Transport`] performs one GET and classifies the response; [`RetryingFetcher`]
//! wraps a transport with the backoff schedule. The production transport is
//! [`HttpTransport`], a pooled reqwest client shared by every worker.

use crate::config::HttpConfig;
use crate::error::{Error, Result, TransferError};
use crate::retry::{BackoffSchedule, retry_with_schedule};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use std::sync::Arc;

/// Response body of a successful fetch
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One attempt at fetching a URL
///
/// Implementations return the body stream on success, [`TransferError::NotFound`]
/// when the remote says the resource does not exist, and
/// [`TransferError::Transient`] for anything worth retrying.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a single GET for `url`
    async fn get(&self, url: &str) -> Result<ByteStream>;
}

/// reqwest-backed [`Transport`] with a connection pool sized for many small fetches
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the shared client from HTTP settings
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_connections_per_host)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| Error::Config {
            message: format!("Failed to create HTTP client: {}", e),
            key: Some("http".to_string()),
        })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<ByteStream> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                e.to_string()
            };
            TransferError::Transient {
                url: url.to_string(),
                reason,
            }
        })?;

        match response.status() {
            StatusCode::OK => {
                let owned_url = url.to_string();
                Ok(response
                    .bytes_stream()
                    .map_err(move |e| {
                        Error::Transfer(TransferError::Transient {
                            url: owned_url.clone(),
                            reason: format!("body read failed: {}", e),
                        })
                    })
                    .boxed())
            }
            StatusCode::NOT_FOUND => Err(TransferError::NotFound {
                url: url.to_string(),
            }
            .into()),
            status => Err(TransferError::Transient {
                url: url.to_string(),
                reason: format!("code is {}", status.as_u16()),
            }
            .into()),
        }
    }
}

/// Fetches URLs through a [`Transport`], retrying transient failures on a fixed schedule
///
/// A 404 fails fast; everything else that is not a 200 is retried until the
/// schedule runs out.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    schedule: BackoffSchedule,
}

impl RetryingFetcher {
    /// Create a fetcher over `transport`
    pub fn new(transport: Arc<dyn Transport>, schedule: BackoffSchedule) -> Self {
        Self {
            transport,
            schedule,
        }
    }

    /// Fetch `url`, returning its body stream or the last error
    pub async fn fetch(&self, url: &str) -> Result<ByteStream> {
        retry_with_schedule(&self.schedule, || self.transport.get(url)).await
    }
}
