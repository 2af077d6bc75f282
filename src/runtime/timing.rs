//! Politeness delays.
//!
//! A delay is either fixed or sampled uniformly from a range, then multiplied
//! by the run's timing scale. Waits observe the run's cancellation token so an
//! interrupted run never sits out a long pause.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::config::{ConfigError, validate_timing_scale};

/// Delay requested by an add-on, before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayRequest {
    Fixed(Duration),
    Range { min: Duration, max: Duration },
}

impl DelayRequest {
    pub fn fixed(duration: Duration) -> Self {
        DelayRequest::Fixed(duration)
    }

    pub fn range(min: Duration, max: Duration) -> Self {
        DelayRequest::Range { min, max }.normalized()
    }

    /// Swaps inverted range bounds. Fixed requests are returned unchanged.
    pub fn normalized(self) -> Self {
        match self {
            DelayRequest::Range { min, max } if min > max => DelayRequest::Range { min: max, max: min },
            other => other,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DelayError {
    #[error("wait cancelled before the delay elapsed")]
    Cancelled,
}

/// Computes and awaits scaled, jittered delays.
pub struct DelayScheduler {
    timing_scale: f64,
    rng: Mutex<Box<dyn RngCore + Send>>,
    cancel: CancellationToken,
}

impl DelayScheduler {
    /// Scheduler backed by an entropy-seeded generator.
    pub fn new(timing_scale: f64) -> Result<Self, ConfigError> {
        Self::with_rng(timing_scale, StdRng::from_entropy())
    }

    /// Scheduler whose sampled delays are reproducible for a given seed.
    pub fn seeded(timing_scale: f64, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(timing_scale, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng<R>(timing_scale: f64, rng: R) -> Result<Self, ConfigError>
    where
        R: RngCore + Send + 'static,
    {
        validate_timing_scale(timing_scale)?;
        Ok(Self {
            timing_scale,
            rng: Mutex::new(Box::new(rng)),
            cancel: CancellationToken::new(),
        })
    }

    /// Binds waits to `token`; cancelling it ends any pending wait.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn timing_scale(&self) -> f64 {
        self.timing_scale
    }

    /// Effective delay for `request`, without sleeping.
    ///
    /// Ranges draw one uniform sample in `[0, 1)` from the generator.
    pub fn sample(&self, request: DelayRequest) -> Duration {
        let base = match request.normalized() {
            DelayRequest::Fixed(duration) => duration,
            DelayRequest::Range { min, max } => {
                let unit: f64 = self
                    .rng
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .r#gen();
                min + (max - min).mul_f64(unit)
            }
        };
        scale_duration(base, self.timing_scale)
    }

    /// Suspends for the scaled delay and returns what was applied.
    pub async fn wait(&self, request: DelayRequest) -> Result<Duration, DelayError> {
        if self.cancel.is_cancelled() {
            return Err(DelayError::Cancelled);
        }

        let delay = self.sample(request);
        if delay.is_zero() {
            return Ok(delay);
        }

        log::debug!("politeness delay {:.3}s", delay.as_secs_f64());
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DelayError::Cancelled),
            _ = sleep(delay) => Ok(delay),
        }
    }

    pub async fn wait_for(&self, duration: Duration) -> Result<Duration, DelayError> {
        self.wait(DelayRequest::Fixed(duration)).await
    }

    pub async fn wait_between(&self, min: Duration, max: Duration) -> Result<Duration, DelayError> {
        self.wait(DelayRequest::Range { min, max }).await
    }

    pub async fn wait_ms(&self, millis: u64) -> Result<Duration, DelayError> {
        self.wait_for(Duration::from_millis(millis)).await
    }

    pub async fn wait_ms_between(&self, min_ms: u64, max_ms: u64) -> Result<Duration, DelayError> {
        self.wait_between(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
            .await
    }
}

impl fmt::Debug for DelayScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayScheduler")
            .field("timing_scale", &self.timing_scale)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// Saturates instead of panicking on overflow.
fn scale_duration(duration: Duration, scale: f64) -> Duration {
    let nanos = (duration.as_nanos() as f64 * scale).round();
    if nanos >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn rejects_negative_scale() {
        assert!(matches!(
            DelayScheduler::new(-1.0),
            Err(ConfigError::InvalidTimingScale(_))
        ));
    }

    #[test]
    fn fixed_delay_is_scaled() {
        let scheduler = DelayScheduler::seeded(2.5, 1).unwrap();
        assert_eq!(scheduler.sample(DelayRequest::fixed(ms(100))), ms(250));
    }

    #[test]
    fn ranged_samples_stay_within_scaled_bounds() {
        let scheduler = DelayScheduler::seeded(2.0, 7).unwrap();
        for _ in 0..500 {
            let delay = scheduler.sample(DelayRequest::range(ms(100), ms(300)));
            assert!(delay >= ms(200) && delay < ms(600), "{delay:?}");
        }
    }

    #[test]
    fn inverted_range_matches_normal_range() {
        let forward = DelayScheduler::seeded(1.0, 42).unwrap();
        let inverted = DelayScheduler::seeded(1.0, 42).unwrap();
        for _ in 0..50 {
            let a = forward.sample(DelayRequest::Range { min: ms(100), max: ms(900) });
            let b = inverted.sample(DelayRequest::Range { min: ms(900), max: ms(100) });
            assert_eq!(a, b);
        }
    }

    #[test]
    fn same_seed_reproduces_samples() {
        let first = DelayScheduler::seeded(1.5, 2024).unwrap();
        let second = DelayScheduler::seeded(1.5, 2024).unwrap();
        let request = DelayRequest::range(ms(1000), ms(3000));
        let a: Vec<_> = (0..20).map(|_| first.sample(request)).collect();
        let b: Vec<_> = (0..20).map(|_| second.sample(request)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn overflow_saturates() {
        let scheduler = DelayScheduler::seeded(1e12, 0).unwrap();
        assert_eq!(scheduler.sample(DelayRequest::fixed(Duration::from_secs(u64::MAX / 2))), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_suspends_for_scaled_duration() {
        let scheduler = DelayScheduler::seeded(2.0, 3).unwrap();
        let started = Instant::now();
        let applied = scheduler.wait_ms(100).await.unwrap();
        let elapsed = started.elapsed();
        assert_eq!(applied, ms(200));
        assert!(elapsed >= ms(200) && elapsed < ms(205), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_scale_returns_immediately() {
        let scheduler = DelayScheduler::seeded(0.0, 3).unwrap();
        let started = Instant::now();
        let applied = scheduler.wait_ms_between(5_000, 10_000).await.unwrap();
        assert_eq!(applied, Duration::ZERO);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unblocks_pending_wait() {
        let token = CancellationToken::new();
        let scheduler = DelayScheduler::seeded(1.0, 3)
            .unwrap()
            .with_cancellation(token.clone());

        let canceller = tokio::spawn({
            let token = token.clone();
            async move {
                sleep(ms(50)).await;
                token.cancel();
            }
        });

        let started = Instant::now();
        let result = scheduler.wait_for(Duration::from_secs(3600)).await;
        canceller.await.unwrap();

        assert_eq!(result, Err(DelayError::Cancelled));
        assert!(started.elapsed() < ms(100));
    }

    #[tokio::test]
    async fn already_cancelled_wait_fails_fast() {
        let token = CancellationToken::new();
        token.cancel();
        let scheduler = DelayScheduler::seeded(0.0, 3)
            .unwrap()
            .with_cancellation(token);
        assert_eq!(scheduler.wait_ms(10).await, Err(DelayError::Cancelled));
    }
}
