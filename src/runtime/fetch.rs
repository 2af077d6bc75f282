//! Timeout-bounded HTTP GET.
//!
//! Each fetch races the transport against a deadline and the run's
//! cancellation token. Whichever settles first decides the outcome; the
//! losing futures are dropped when the race returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::RuntimeConfig;

/// Contract that abstracts the HTTP transport used by add-ons.
///
/// Implementations are expected to apply the shared cookie store and decode
/// compressed bodies before returning.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<FetchResponse, TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http transport error: {0}")]
    Transport(String),
}

/// Fully read response returned to add-ons.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Target URL plus an optional per-request timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub timeout_ms: Option<u64>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("network error: {0}")]
    Network(#[from] TransportError),
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: Url, timeout: Duration },
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}

/// Issues GETs through the shared transport, bounded by a deadline.
#[derive(Clone)]
pub struct TimedFetcher {
    transport: Arc<dyn HttpTransport>,
    default_timeout: Duration,
    cancel: CancellationToken,
}

impl TimedFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &RuntimeConfig) -> Self {
        Self {
            transport,
            default_timeout: config.default_timeout(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Deadline that applies to `request`.
    pub fn timeout_for(&self, request: &FetchRequest) -> Duration {
        request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    pub async fn get(&self, url: &str) -> FetchResult<FetchResponse> {
        self.fetch(FetchRequest::new(url)).await
    }

    /// Performs the request. Polling order is cancellation, then request,
    /// then timer, so a request that is ready wins over an expired timer.
    pub async fn fetch(&self, request: FetchRequest) -> FetchResult<FetchResponse> {
        let url = Url::parse(&request.url).map_err(|source| FetchError::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;
        let timeout = self.timeout_for(&request);

        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        log::debug!("-> GET {url} (timeout {}ms)", timeout.as_millis());
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.transport.get(&url) => result.map_err(FetchError::from),
            _ = sleep(timeout) => Err(FetchError::Timeout { url: url.clone(), timeout }),
        };

        match &outcome {
            Ok(response) => log::debug!(
                "<- {} {} ({:.2}s)",
                response.status,
                response.url,
                started.elapsed().as_secs_f64()
            ),
            Err(FetchError::Timeout { .. }) => {
                log::warn!("GET {url} timed out after {}ms", timeout.as_millis())
            }
            Err(err) => log::debug!("GET {url} failed: {err}"),
        }

        outcome
    }
}

impl std::fmt::Debug for TimedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedFetcher")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
