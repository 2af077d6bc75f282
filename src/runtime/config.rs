//! Run-wide configuration shared read-only by every service.

use std::time::Duration;

use thiserror::Error;

/// Default timeout applied to fetches without an explicit override.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default multiplier applied to politeness delays.
pub const DEFAULT_TIMING_SCALE: f64 = 1.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: timing scale must be a finite value >= 0 (got {0})")]
    InvalidTimingScale(f64),
    #[error("invalid configuration: timeout must be >= 0 ms (got {0})")]
    InvalidTimeout(i64),
}

/// Timing scale and default timeout for one run.
///
/// Values are validated on construction and cannot change afterwards, so a
/// module holding a `RuntimeConfig` always sees a consistent pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    timing_scale: f64,
    default_timeout: Duration,
}

impl RuntimeConfig {
    pub fn new(timing_scale: f64, default_timeout: Duration) -> Result<Self, ConfigError> {
        validate_timing_scale(timing_scale)?;
        Ok(Self {
            timing_scale,
            default_timeout,
        })
    }

    /// Builds a config from raw command-line style values, rejecting negative
    /// timeouts instead of wrapping them.
    pub fn from_millis(timing_scale: f64, default_timeout_ms: i64) -> Result<Self, ConfigError> {
        let millis = u64::try_from(default_timeout_ms)
            .map_err(|_| ConfigError::InvalidTimeout(default_timeout_ms))?;
        Self::new(timing_scale, Duration::from_millis(millis))
    }

    pub fn timing_scale(&self) -> f64 {
        self.timing_scale
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn default_timeout_ms(&self) -> u64 {
        self.default_timeout.as_millis().min(u64::MAX as u128) as u64
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timing_scale: DEFAULT_TIMING_SCALE,
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

pub(crate) fn validate_timing_scale(scale: f64) -> Result<(), ConfigError> {
    if scale.is_finite() && scale >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimingScale(scale))
    }
}
