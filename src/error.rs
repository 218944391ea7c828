//! Error types for the exchange rate service.

use std::time::Duration;
use thiserror::Error;

/// Boxed cause carried through the cache's loader boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by the external rate source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connect, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with an explicit error payload.
    #[error("External API error: {0}")]
    Api(String),

    /// The rates object does not contain the base currency's own code.
    #[error("Rates not found for currency: {0}")]
    MissingSelfRate(String),

    /// The body could not be understood.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// What the fetcher's fallback receives once the resilience policies give up.
#[derive(Debug, Error)]
pub enum FetchFailure {
    /// Every retry attempt failed; carries the last failure.
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: SourceError,
    },

    /// The circuit breaker rejected the call without invoking the source.
    #[error("circuit breaker is open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },
}

/// Errors raised by the expiring cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The loader passed to `get_or_compute` failed. Nothing was stored.
    #[error("Failed to load value for key '{key}' in cache '{cache}': {source}")]
    LoadFailure {
        cache: String,
        key: String,
        #[source]
        source: BoxError,
    },
}

/// Persistence collaborator failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not parse {name}='{value}'")]
    Parse { name: String, value: String },
}

/// Domain errors surfaced by the services.
#[derive(Debug, Error)]
pub enum RateError {
    /// Requested code is not in the currency directory.
    #[error("Currency not found: {0}")]
    CurrencyNotFound(String),

    /// Code is not three ASCII letters.
    #[error("Invalid currency code '{0}': must be exactly 3 letters")]
    InvalidCurrencyCode(String),

    /// Produced by the fetcher's fallback.
    #[error("External source unavailable for {code}: {source}")]
    ExternalSource {
        code: String,
        #[source]
        source: FetchFailure,
    },

    /// The lookup's loader failed.
    #[error("Exchange rate unavailable for {code}: {source}")]
    RateUnavailable {
        code: String,
        #[source]
        source: CacheError,
    },

    /// The currency catalogue could not be loaded.
    #[error("Currency catalogue unavailable: {0}")]
    CatalogUnavailable(#[source] CacheError),

    /// Direct upstream failure outside the resilient fetch path.
    #[error(transparent)]
    Upstream(#[from] SourceError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

impl RateError {
    /// True for the not-found class of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RateError::CurrencyNotFound(_))
    }

    /// True for the service-unavailable class of failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RateError::ExternalSource { .. }
                | RateError::RateUnavailable { .. }
                | RateError::CatalogUnavailable(_)
                | RateError::Upstream(_)
        )
    }
}

/// Result type for service operations.
pub type RateResult<T> = Result<T, RateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_unavailable_keeps_cause_chain() {
        let err = RateError::RateUnavailable {
            code: "USD".to_string(),
            source: CacheError::LoadFailure {
                cache: "exchange-rates".to_string(),
                key: "USD".to_string(),
                source: Box::new(RateError::ExternalSource {
                    code: "USD".to_string(),
                    source: FetchFailure::CircuitOpen {
                        retry_after: Duration::from_secs(5),
                    },
                }),
            },
        };

        assert!(err.is_unavailable());
        assert!(!err.is_not_found());

        let load = err.source().unwrap();
        assert!(load.to_string().contains("exchange-rates"));
        let inner = load.source().unwrap();
        assert!(inner.to_string().contains("External source unavailable"));
    }

    #[test]
    fn test_not_found_classification() {
        let err = RateError::CurrencyNotFound("ZZZ".to_string());
        assert!(err.is_not_found());
        assert!(!err.is_unavailable());
        assert_eq!(err.to_string(), "Currency not found: ZZZ");
    }
}
