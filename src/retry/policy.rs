//! Bounded exponential backoff around remote-store calls.

use super::classify::{classify, Verdict};
use super::error::{RemoteError, StoreError};
use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Wraps a fallible async operation with classification-driven retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        backoff_factor: f64,
        max_delay: Duration,
        jitter_ratio: f64,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            backoff_factor: backoff_factor.max(1.0),
            max_delay,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            config.backoff_factor,
            Duration::from_millis(config.max_delay_ms),
            config.jitter_ratio,
        )
    }

    /// Policy that never retries. Useful for probes and tests.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, 1.0, Duration::ZERO, 0.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.backoff_factor.powi(exponent);
        if !multiplier.is_finite()
            || self.base_delay.as_secs_f64() * multiplier >= self.max_delay.as_secs_f64()
        {
            return self.max_delay;
        }
        self.base_delay.mul_f64(multiplier)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_ratio * rand::random::<f64>();
        delay + Duration::from_secs_f64(spread)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The operation is re-invoked from scratch on every attempt, so the
    /// closure must produce a fresh future each time.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if classify(error.code) == Verdict::Fatal {
                        tracing::warn!(
                            operation,
                            attempt,
                            code = %error.code,
                            error = %error.message,
                            "remote call failed with non-retryable error"
                        );
                        return Err(StoreError::from_remote(operation, attempt, error));
                    }

                    if attempt >= max_attempts {
                        tracing::warn!(
                            operation,
                            attempts = attempt,
                            code = %error.code,
                            error = %error.message,
                            "remote call failed, retries exhausted"
                        );
                        return Err(StoreError::from_remote(operation, attempt, error));
                    }

                    let delay = self.jittered(self.backoff_delay(attempt));
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        code = %error.code,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
