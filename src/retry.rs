//! Bounded retry with exponential backoff.
//!
//! Every retried operation in the pipeline (page fetches, classifier calls,
//! storage lookups) goes through [`RetryPolicy::run`] with a caller-supplied
//! retryability predicate. Permanent errors surface immediately; transient
//! errors are retried with doubling delays up to a cap, plus a small random
//! jitter so parallel workers do not retry in lockstep.
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;

/// Maximum random jitter added to each backoff delay.
const JITTER_MS: u64 = 250;

/// Retry schedule: total attempts and the backoff delay bounds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay (jitter excluded).
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Policy with no backoff delay. Intended for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff delay before retrying after the given 1-based attempt,
    /// excluding jitter: `base * 2^(attempt-1)`, capped at `max_delay`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        // Exponent is clamped so the multiplier cannot overflow.
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        raw.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `is_retryable` decides whether an error is transient. The last error
    /// is returned when retries are exhausted or the error is permanent.
    /// `label` names the operation in retry logs.
    pub async fn run<T, E, Fut, Op, Pred>(
        &self,
        label: &str,
        is_retryable: Pred,
        mut op: Op,
    ) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Pred: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    if !delay.is_zero() {
                        let jitter = rand::thread_rng().gen_range(0..=JITTER_MS);
                        tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: cfg.base_delay(),
            max_delay: cfg.max_delay(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
