//! HTTP client for the paginated results endpoint. Houses the
//! `HttpResultsClient`, error types, and the `ResultsTransport` trait
//! consumed by polling sessions.

use crate::client::metrics::{TransportMetrics, TransportMetricsSnapshot};
use crate::client::options::HttpClientOptions;
use crate::runtime::config::PollerConfig;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug)]
pub enum TransportError {
    Timeout { url: String },
    Request { url: String, message: String },
    Read { url: String, message: String },
    ResponseTooLarge { url: String, limit_bytes: usize },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout { url } => write!(f, "request to {url} timed out"),
            TransportError::Request { url, message } => {
                write!(f, "request to {url} failed: {message}")
            }
            TransportError::Read { url, message } => {
                write!(f, "failed to read response body from {url}: {message}")
            }
            TransportError::ResponseTooLarge { url, limit_bytes } => {
                write!(f, "response from {url} exceeded the {limit_bytes} byte limit")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Object-safe seam between the polling loop and the HTTP layer.
///
/// A completed exchange returns the raw body regardless of status code;
/// `TransportError` is reserved for connect, timeout, and read failures.
pub trait ResultsTransport: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        query: &'a str,
        offset: u64,
    ) -> BoxFuture<'a, Result<String, TransportError>>;
}

#[derive(Debug, Clone)]
pub struct HttpResultsClient {
    results_url: Arc<String>,
    client: reqwest::Client,
    options: HttpClientOptions,
    metrics: Arc<TransportMetrics>,
}

impl ResultsTransport for HttpResultsClient {
    fn fetch_page<'a>(
        &'a self,
        query: &'a str,
        offset: u64,
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        Box::pin(self.fetch_page(query, offset))
    }
}

impl HttpResultsClient {
    pub fn new(results_url: impl Into<String>) -> Result<Self> {
        Self::with_options(results_url, HttpClientOptions::default())
    }

    pub fn with_options(results_url: impl Into<String>, options: HttpClientOptions) -> Result<Self> {
        options.validate()?;

        let results_url = results_url.into();
        let client = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.request_timeout)
            .build()
            .map_err(|err| anyhow!("failed to build HTTP client: {err}"))?;

        Ok(Self {
            results_url: Arc::new(results_url),
            client,
            options,
            metrics: Arc::new(TransportMetrics::default()),
        })
    }

    pub fn from_config(config: &PollerConfig) -> Result<Self> {
        config.validate()?;
        let options = HttpClientOptions {
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent().to_owned(),
            ..HttpClientOptions::default()
        };
        Self::with_options(config.results_url().to_owned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.results_url
    }

    pub fn metrics(&self) -> TransportMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Fetches one page of results for `query` starting at `offset`.
    ///
    /// Returns the raw body for any completed exchange. Non-success statuses
    /// are logged and still produce a body so callers decide what counts as
    /// usable.
    pub async fn fetch_page(&self, query: &str, offset: u64) -> Result<String, TransportError> {
        let start = Instant::now();
        let result = self.perform_fetch(query, offset).await;

        match &result {
            Ok(body) => self.metrics.record_success(start.elapsed(), body.len() as u64),
            Err(TransportError::Timeout { .. }) => self.metrics.record_timeout(start.elapsed()),
            Err(_) => self.metrics.record_failure(start.elapsed()),
        }

        result
    }

    async fn perform_fetch(&self, query: &str, offset: u64) -> Result<String, TransportError> {
        let offset_param = offset.to_string();
        let response = self
            .client
            .get(self.results_url.as_str())
            .query(&[("q", query), ("o", offset_param.as_str())])
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                offset,
                "results endpoint returned a non-success status"
            );
        }

        if let Some(length) = response.content_length() {
            if length > self.options.max_response_body_bytes as u64 {
                return Err(self.too_large());
            }
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.map_read_error(err))?;
        if body.len() > self.options.max_response_body_bytes {
            return Err(self.too_large());
        }

        tracing::debug!(
            status = %status,
            offset,
            body_bytes = body.len(),
            "fetched results page"
        );
        Ok(body)
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: self.results_url.as_str().to_owned(),
            }
        } else {
            TransportError::Request {
                url: self.results_url.as_str().to_owned(),
                message: err.to_string(),
            }
        }
    }

    fn map_read_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: self.results_url.as_str().to_owned(),
            }
        } else {
            TransportError::Read {
                url: self.results_url.as_str().to_owned(),
                message: err.to_string(),
            }
        }
    }

    fn too_large(&self) -> TransportError {
        TransportError::ResponseTooLarge {
            url: self.results_url.as_str().to_owned(),
            limit_bytes: self.options.max_response_body_bytes,
        }
    }
}
