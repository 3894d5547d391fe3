//! Bounded exponential backoff for individual provider calls.
//!
//! Adapters wrap each outgoing call in [`with_retry`]: transient failures
//! are retried with exponential backoff and jitter, a server-provided
//! retry delay is honored and propagated to the shared [`RateGate`] so
//! every sibling call pauses too, and permanent failures return
//! immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::rate_limit::RateGate;
use super::types::ProviderError;

/// Retry configuration for one adapter instance.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Randomization factor applied to every delay (0.25 means +/- 25%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries, for tests and dry runs.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Run `op` with bounded retries.
///
/// Every attempt first awaits the shared `gate`. On a retryable error the
/// delay is the server-provided `retry_after` when present (which also
/// pauses the gate for all sibling calls), otherwise the jittered backoff
/// interval. Non-retryable errors and exhausted attempts return the last
/// error as-is.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    gate: &RateGate,
    operation: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut interval = policy.initial_interval;
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        gate.wait_ready().await;

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = match &err {
                    ProviderError::RateLimited {
                        retry_after: Some(d),
                    } => {
                        // Rate limits pause the whole adapter, not just
                        // this call.
                        gate.pause_for(*d);
                        *d
                    }
                    ProviderError::RateLimited { retry_after: None } => {
                        let d = jittered(interval, policy.jitter);
                        gate.pause_for(d);
                        d
                    }
                    _ => jittered(interval, policy.jitter),
                };
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying provider call"
                );
                tokio::time::sleep(delay).await;
                interval = Duration::min(interval.mul_f64(policy.multiplier), policy.max_interval);
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("loop returns on the final attempt")
}

fn jittered(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let factor = 1.0 - jitter + rand::rng().random::<f64>() * 2.0 * jitter;
    base.mul_f64(factor)
}
