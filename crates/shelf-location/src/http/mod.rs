//! HTTP client implementation with connection pooling and retry logic

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shelf_config::NetworkSection;
use shelf_core::error::ShelfError;
use tracing::{debug, warn};

use crate::LocationResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_network(&NetworkSection::default())
    }
}

impl RetryConfig {
    pub fn from_network(network: &NetworkSection) -> Self {
        Self {
            max_retries: network.max_retries,
            initial_delay: Duration::from_millis(network.initial_backoff_ms),
            max_delay: Duration::from_millis(network.max_backoff_ms),
            multiplier: 2.0,
        }
    }

    /// Delay to wait after one that just elapsed
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64);
        std::cmp::min(next, self.max_delay)
    }
}

/// Shared HTTP client for the site and Chef server locations
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    retry_config: RetryConfig,
    /// Applied to every request, body included
    timeout: Duration,
}

impl HttpClient {
    /// Create a client from the network section of the configuration
    pub fn new(network: &NetworkSection) -> LocationResult<Self> {
        Self::with_config(RetryConfig::from_network(network), Duration::from_secs(network.timeout_secs))
    }

    /// Create a client with an explicit retry policy and timeout
    pub fn with_config(retry_config: RetryConfig, timeout: Duration) -> LocationResult<Self> {
        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .connect_timeout(timeout)
            .gzip(true)
            .user_agent(concat!("shelf/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ShelfError::download("-", "Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            retry_config,
            timeout,
        })
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute an operation under this client's retry policy
    pub async fn with_retry<F, Fut, T>(&self, operation: F) -> LocationResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = LocationResult<T>>,
    {
        with_retry(&self.retry_config, operation).await
    }

    /// GET a JSON document, None when the server reports it missing
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: &HeaderMap) -> LocationResult<Option<T>> {
        self.with_retry(|| async {
            let Some(response) = self.send(url, headers).await? else {
                return Ok(None);
            };
            response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| ShelfError::download(url, "Failed to parse response", e))
        })
        .await
    }

    /// GET a binary body, None when the server reports it missing
    pub async fn get_bytes(&self, url: &str, headers: &HeaderMap) -> LocationResult<Option<Vec<u8>>> {
        self.with_retry(|| async {
            let Some(response) = self.send(url, headers).await? else {
                return Ok(None);
            };
            let bytes = response
                .bytes()
                .await
                .map_err(|e| classify_transport(url, e))?;
            debug!(url, bytes = bytes.len(), "downloaded");
            Ok(Some(bytes.to_vec()))
        })
        .await
    }

    async fn send(&self, url: &str, headers: &HeaderMap) -> LocationResult<Option<Response>> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| classify_transport(url, e))?;

        match response.status() {
            status if status.is_success() => Ok(Some(response)),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Err(ShelfError::Authentication {
                url: url.to_string(),
                message: format!("server returned {}", status),
            }),
            status => Err(ShelfError::Download {
                url: url.to_string(),
                message: format!("server returned {}", status),
                source: None,
            }),
        }
    }
}

/// Execute an operation, retrying transient failures with exponential backoff
///
/// Only errors that report themselves retryable are retried; everything else
/// is returned on first occurrence.
pub async fn with_retry<F, Fut, T>(retry_config: &RetryConfig, operation: F) -> LocationResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = LocationResult<T>>,
{
    let mut delay = retry_config.initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !error.is_retryable() || attempt == retry_config.max_retries {
                    return Err(error);
                }

                attempt += 1;
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
                tokio::time::sleep(delay).await;
                delay = retry_config.next_delay(delay);
            },
        }
    }
}

fn classify_transport(url: &str, error: reqwest::Error) -> ShelfError {
    let message = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    ShelfError::download(url, message, error)
}
