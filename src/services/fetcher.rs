//! Resilient wrapper around the external rate source.
//!
//! The circuit breaker sits outside the retry loop: one breaker outcome is
//! recorded per retried call, and retries only run while the breaker admits
//! the call. When either policy gives up the fallback decides the result.

use crate::api::RateSource;
use crate::config::{CircuitBreakerConfig, RetryConfig};
use crate::error::{FetchFailure, RateError, SourceError};
use crate::models::{Currency, ExchangeRate};
use crate::services::circuit_breaker::{CircuitBreaker, CircuitState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Called with the original input and the failure that ended the call.
pub type Fallback =
    Arc<dyn Fn(&Currency, FetchFailure) -> Result<ExchangeRate, RateError> + Send + Sync>;

/// Retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff,
            multiplier: config.backoff_multiplier,
            max_backoff: config.max_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before retry number `attempt` (1-based, counting the retry).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }

    /// Run `operation` until it succeeds or attempts run out. The error of
    /// the last attempt is returned on exhaustion.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    let wait = self.backoff(attempt);
                    warn!(
                        call = %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Upstream call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Converts any exhaustion into an explicit "external source unavailable".
pub fn unavailable_fallback() -> Fallback {
    Arc::new(|currency: &Currency, failure: FetchFailure| -> Result<ExchangeRate, RateError> {
        error!(currency = %currency, error = %failure, "Fallback invoked");
        Err(RateError::ExternalSource {
            code: currency.code().to_string(),
            source: failure,
        })
    })
}

/// Fetches rates through retry, circuit breaker and fallback.
///
/// A `fetch` dropped mid-call reports nothing to the breaker.
pub struct ResilientFetcher {
    source: Arc<dyn RateSource>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    fallback: Fallback,
}

impl ResilientFetcher {
    pub fn new(
        source: Arc<dyn RateSource>,
        retry: &RetryConfig,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        let breaker = CircuitBreaker::new(source.name(), breaker);
        Self {
            source,
            retry: RetryPolicy::new(retry),
            breaker,
            fallback: unavailable_fallback(),
        }
    }

    /// Replace the fallback.
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub async fn fetch(&self, currency: &Currency) -> Result<ExchangeRate, RateError> {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejected) => {
                debug!(currency = %currency, "Circuit open, skipping upstream call");
                return (self.fallback)(
                    currency,
                    FetchFailure::CircuitOpen {
                        retry_after: rejected.retry_after,
                    },
                );
            }
        };

        let outcome = self
            .retry
            .run(currency.code(), || self.source.fetch_rates(currency))
            .await;

        match outcome {
            Ok(rate) => {
                permit.success();
                debug!(currency = %currency, source = self.source.name(), "Fetched exchange rate");
                Ok(rate)
            }
            Err(e) => {
                permit.failure();
                (self.fallback)(
                    currency,
                    FetchFailure::Exhausted {
                        attempts: self.retry.max_attempts(),
                        source: e,
                    },
                )
            }
        }
    }
}
