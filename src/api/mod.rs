//! External rate source seam.

pub mod exchange_rates;

use crate::error::SourceError;
use crate::models::{Currency, ExchangeRate};
use async_trait::async_trait;

pub use exchange_rates::ExchangeRatesApi;

/// Upstream provider of exchange rates and the currency catalogue.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    /// Latest rates quoted against `currency`.
    async fn fetch_rates(&self, currency: &Currency) -> Result<ExchangeRate, SourceError>;

    /// Every currency the provider can quote.
    async fn fetch_symbols(&self) -> Result<Vec<Currency>, SourceError>;
}

/// Scriptable source for tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    rates: dashmap::DashMap<String, std::collections::HashMap<String, f64>>,
    failures_left: dashmap::DashMap<String, u32>,
    always_fail: std::sync::atomic::AtomicBool,
    calls: dashmap::DashMap<String, usize>,
    delay_ms: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    pub fn new() -> Self {
        Self {
            rates: dashmap::DashMap::new(),
            failures_left: dashmap::DashMap::new(),
            always_fail: std::sync::atomic::AtomicBool::new(false),
            calls: dashmap::DashMap::new(),
            delay_ms: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Serve `rates` for `code`.
    pub fn set_rates(&self, code: &str, rates: &[(&str, f64)]) {
        let rates = rates.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        self.rates.insert(code.to_string(), rates);
    }

    /// Fail the next `times` calls for `code`, then behave normally.
    pub fn fail_next(&self, code: &str, times: u32) {
        self.failures_left.insert(code.to_string(), times);
    }

    pub fn fail_always(&self, fail: bool) {
        self.always_fail
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Hold every rates call for `delay` before answering.
    pub fn set_delay(&self, delay: std::time::Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls_for(&self, code: &str) -> usize {
        self.calls.get(code).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockRateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        "MOCK"
    }

    async fn fetch_rates(&self, currency: &Currency) -> Result<ExchangeRate, SourceError> {
        let code = currency.code();
        *self.calls.entry(code.to_string()).or_insert(0) += 1;

        let delay = self.delay_ms.load(std::sync::atomic::Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        if self.always_fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SourceError::Api("mock outage".to_string()));
        }
        if let Some(mut left) = self.failures_left.get_mut(code) {
            if *left > 0 {
                *left -= 1;
                return Err(SourceError::Api(format!("mock failure for {}", code)));
            }
        }

        let rates = self
            .rates
            .get(code)
            .map(|r| r.clone())
            .ok_or_else(|| SourceError::MissingSelfRate(code.to_string()))?;
        let rate = ExchangeRate::new(currency.clone(), rates);
        if !rate.has_self_rate() {
            return Err(SourceError::MissingSelfRate(code.to_string()));
        }
        Ok(rate)
    }

    async fn fetch_symbols(&self) -> Result<Vec<Currency>, SourceError> {
        let mut symbols: Vec<Currency> = self.rates.iter().map(|r| Currency::new(r.key())).collect();
        symbols.sort();
        Ok(symbols)
    }
}
