//! Service configuration.

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

/// External rate API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Endpoint returning the latest rates for a base currency.
    pub rates_url: String,
    /// Endpoint returning the supported currency symbols.
    pub symbols_url: String,
    /// API access key, sent as a query parameter.
    pub access_key: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            rates_url: "https://api.exchangeratesapi.io/v1/latest".to_string(),
            symbols_url: "https://api.exchangeratesapi.io/v1/symbols".to_string(),
            access_key: String::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Cache lifetimes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub currencies_ttl: Duration,
    pub exchange_rates_ttl: Duration,
    /// Maximum age of a persisted snapshot the lookup path will reuse.
    /// Independent of `exchange_rates_ttl`.
    pub staleness_window: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            currencies_ttl: Duration::from_secs(24 * 60 * 60),
            exchange_rates_ttl: Duration::from_secs(60 * 60),
            staleness_window: Duration::from_secs(60 * 60),
        }
    }
}

/// Retry policy for upstream calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0..=1.0) over the window that opens the circuit.
    pub failure_rate_threshold: f64,
    /// Number of most recent outcomes considered.
    pub sliding_window_size: usize,
    /// Outcomes required before the ratio is evaluated.
    pub minimum_calls: usize,
    /// How long the circuit stays open before allowing trial calls.
    pub open_cooldown: Duration,
    /// Trial calls admitted while half-open.
    pub half_open_permitted_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 10,
            minimum_calls: 5,
            open_cooldown: Duration::from_secs(60),
            half_open_permitted_calls: 3,
        }
    }
}

/// Bulk refresh settings.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
    /// Upper bound on in-flight fetches during a refresh pass.
    pub max_concurrency: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            initial_delay: Duration::from_secs(1),
            max_concurrency: 16,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub refresh: RefreshConfig,
}

impl AppConfig {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("EXCHANGE_API_URL") {
            config.api.rates_url = url;
        }
        if let Ok(url) = std::env::var("EXCHANGE_API_SYMBOLS_URL") {
            config.api.symbols_url = url;
        }
        if let Ok(key) = std::env::var("EXCHANGE_API_ACCESS_KEY") {
            config.api.access_key = key;
        }
        if let Some(ms) = env_parse::<u64>("EXCHANGE_API_TIMEOUT_MS")? {
            config.api.request_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = env_parse::<u64>("RATES_CACHE_TTL_SECS")? {
            config.cache.exchange_rates_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("CURRENCIES_CACHE_TTL_SECS")? {
            config.cache.currencies_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("RATES_STALENESS_SECS")? {
            config.cache.staleness_window = Duration::from_secs(secs);
        }

        if let Some(attempts) = env_parse("RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("RETRY_BACKOFF_MS")? {
            config.retry.initial_backoff = Duration::from_millis(ms);
        }
        if let Some(multiplier) = env_parse("RETRY_BACKOFF_MULTIPLIER")? {
            config.retry.backoff_multiplier = multiplier;
        }
        if let Some(ms) = env_parse::<u64>("RETRY_MAX_BACKOFF_MS")? {
            config.retry.max_backoff = Duration::from_millis(ms);
        }

        if let Some(rate) = env_parse("BREAKER_FAILURE_RATE")? {
            config.circuit_breaker.failure_rate_threshold = rate;
        }
        if let Some(calls) = env_parse("BREAKER_MINIMUM_CALLS")? {
            config.circuit_breaker.minimum_calls = calls;
        }
        if let Some(size) = env_parse("BREAKER_WINDOW_SIZE")? {
            config.circuit_breaker.sliding_window_size = size;
        }
        if let Some(calls) = env_parse("BREAKER_HALF_OPEN_CALLS")? {
            config.circuit_breaker.half_open_permitted_calls = calls;
        }
        if let Some(secs) = env_parse::<u64>("BREAKER_COOLDOWN_SECS")? {
            config.circuit_breaker.open_cooldown = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("REFRESH_INTERVAL_SECS")? {
            config.refresh.interval = Duration::from_secs(secs);
        }
        if let Some(limit) = env_parse("REFRESH_MAX_CONCURRENCY")? {
            config.refresh.max_concurrency = limit;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.rates_url.is_empty() || self.api.symbols_url.is_empty() {
            return Err(ConfigError::Invalid("API URLs cannot be empty".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "Retry attempts must be at least 1".to_string(),
            ));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "Backoff multiplier cannot be below 1.0".to_string(),
            ));
        }

        let breaker = &self.circuit_breaker;
        if !(breaker.failure_rate_threshold > 0.0 && breaker.failure_rate_threshold <= 1.0) {
            return Err(ConfigError::Invalid(
                "Failure rate threshold must be within (0, 1]".to_string(),
            ));
        }
        if breaker.minimum_calls == 0 || breaker.minimum_calls > breaker.sliding_window_size {
            return Err(ConfigError::Invalid(
                "Minimum calls must be between 1 and the sliding window size".to_string(),
            ));
        }
        if breaker.half_open_permitted_calls == 0 {
            return Err(ConfigError::Invalid(
                "Half-open permitted calls must be at least 1".to_string(),
            ));
        }

        if self.refresh.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "Refresh concurrency must be at least 1".to_string(),
            ));
        }
        if self.refresh.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Refresh interval cannot be zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    parsed.map(Some).map_err(|_| ConfigError::Parse {
        name: name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.exchange_rates_ttl, Duration::from_secs(3600));
        assert_eq!(config.cache.currencies_ttl, Duration::from_secs(86400));
    }

    #[test]
    fn test_invalid_breaker_settings() {
        let mut config = AppConfig::default();
        config.circuit_breaker.minimum_calls = 20;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.circuit_breaker.failure_rate_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.refresh.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env_overrides_retry_and_breaker_tuning() {
        std::env::set_var("RETRY_BACKOFF_MULTIPLIER", "1.5");
        std::env::set_var("RETRY_MAX_BACKOFF_MS", "2500");
        std::env::set_var("BREAKER_WINDOW_SIZE", "20");
        std::env::set_var("BREAKER_HALF_OPEN_CALLS", "4");

        let config = AppConfig::from_env().unwrap();

        for name in [
            "RETRY_BACKOFF_MULTIPLIER",
            "RETRY_MAX_BACKOFF_MS",
            "BREAKER_WINDOW_SIZE",
            "BREAKER_HALF_OPEN_CALLS",
        ] {
            std::env::remove_var(name);
        }

        assert_eq!(config.retry.backoff_multiplier, 1.5);
        assert_eq!(config.retry.max_backoff, Duration::from_millis(2500));
        assert_eq!(config.circuit_breaker.sliding_window_size, 20);
        assert_eq!(config.circuit_breaker.half_open_permitted_calls, 4);
        assert!(config.validate().is_ok());
    }
}
