//! The contract between the host and an add-on.
//!
//! An add-on implements [`Addon::execute`] and nothing else. Everything it may
//! use (fetcher, delays, cookies, configuration) arrives fully built in an
//! [`AddonContext`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::runtime::{
    CookieStore, DelayError, DelayRequest, DelayScheduler, FetchError, FetchRequest, FetchResponse,
    FetchResult, RuntimeConfig, TimedFetcher,
};

/// A pluggable unit of archiving logic.
#[async_trait]
pub trait Addon: Send {
    /// Runs the add-on to completion.
    async fn execute(&mut self, ctx: &AddonContext) -> Result<(), AddonError>;
}

/// Failure raised by an add-on. The host forwards it untouched.
#[derive(Debug, Error)]
pub enum AddonError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Delay(#[from] DelayError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl AddonError {
    pub fn message(message: impl Into<String>) -> Self {
        AddonError::Message(message.into())
    }

    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AddonError::Other(Box::new(err))
    }
}

/// Services injected into an add-on before it runs.
#[derive(Debug)]
pub struct AddonContext {
    name: String,
    directory: PathBuf,
    config: RuntimeConfig,
    fetcher: TimedFetcher,
    delays: DelayScheduler,
    cookies: Arc<CookieStore>,
    cancel: CancellationToken,
}

impl AddonContext {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        config: RuntimeConfig,
        fetcher: TimedFetcher,
        delays: DelayScheduler,
        cookies: Arc<CookieStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            config,
            fetcher,
            delays,
            cookies,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the add-on's manifest and data files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> RuntimeConfig {
        self.config
    }

    pub fn timing_scale(&self) -> f64 {
        self.config.timing_scale()
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout()
    }

    pub fn cookies(&self) -> &Arc<CookieStore> {
        &self.cookies
    }

    pub fn fetcher(&self) -> &TimedFetcher {
        &self.fetcher
    }

    pub fn delays(&self) -> &DelayScheduler {
        &self.delays
    }

    /// Token fired when the run is cancelled. Add-ons with their own long
    /// suspensions should select on it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// GET `url` with the run's default timeout.
    pub async fn fetch(&self, url: &str) -> FetchResult<FetchResponse> {
        self.fetcher.get(url).await
    }

    /// GET `url` with an explicit timeout in milliseconds.
    pub async fn fetch_with_timeout(&self, url: &str, timeout_ms: u64) -> FetchResult<FetchResponse> {
        self.fetcher
            .fetch(FetchRequest::new(url).with_timeout_ms(timeout_ms))
            .await
    }

    pub async fn wait(&self, request: DelayRequest) -> Result<Duration, DelayError> {
        self.delays.wait(request).await
    }

    pub async fn wait_ms(&self, millis: u64) -> Result<Duration, DelayError> {
        self.delays.wait_ms(millis).await
    }

    pub async fn wait_ms_between(&self, min_ms: u64, max_ms: u64) -> Result<Duration, DelayError> {
        self.delays.wait_ms_between(min_ms, max_ms).await
    }
}
