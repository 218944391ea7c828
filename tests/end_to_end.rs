use async_trait::async_trait;
use exchange_rates::api::RateSource;
use exchange_rates::config::{AppConfig, RetryConfig};
use exchange_rates::error::SourceError;
use exchange_rates::repository::{InMemoryCurrencyRepository, InMemoryExchangeRateRepository};
use exchange_rates::services::CircuitState;
use exchange_rates::{App, Currency, ExchangeRate, RateError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source that quotes every known code against USD/EUR and fails on demand.
struct StubSource {
    codes: Vec<&'static str>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl StubSource {
    fn new(codes: &[&'static str]) -> Self {
        Self {
            codes: codes.to_vec(),
            failing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn fail(&self, code: &str) {
        self.failing.lock().unwrap().insert(code.to_string());
    }

    fn fail_everything(&self) {
        let mut failing = self.failing.lock().unwrap();
        for code in &self.codes {
            failing.insert(code.to_string());
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch_rates(&self, currency: &Currency) -> Result<ExchangeRate, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(currency.code()) {
            return Err(SourceError::Api("timeout".to_string()));
        }

        let mut rates = HashMap::new();
        rates.insert("USD".to_string(), if currency.code() == "USD" { 1.0 } else { 1.1 });
        rates.insert("EUR".to_string(), if currency.code() == "EUR" { 1.0 } else { 0.9 });
        rates.insert(currency.code().to_string(), 1.0);
        Ok(ExchangeRate::new(currency.clone(), rates))
    }

    async fn fetch_symbols(&self) -> Result<Vec<Currency>, SourceError> {
        Ok(self.codes.iter().map(Currency::new).collect())
    }
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_backoff: Duration::from_millis(5),
    };
    config.circuit_breaker.minimum_calls = 3;
    config.circuit_breaker.sliding_window_size = 3;
    config.circuit_breaker.failure_rate_threshold = 1.0;
    config
}

fn app(source: Arc<StubSource>) -> (App, Arc<InMemoryExchangeRateRepository>) {
    let rates = Arc::new(InMemoryExchangeRateRepository::new());
    let app = App::with_parts(
        config(),
        source,
        Arc::new(InMemoryCurrencyRepository::new()),
        rates.clone(),
    );
    (app, rates)
}

#[tokio::test]
async fn get_rate_fetches_once_then_serves_cached_snapshot() {
    let source = Arc::new(StubSource::new(&["USD", "EUR", "GBP"]));
    let (app, repository) = app(source.clone());

    let first = app.rates.get_rate("USD").await.unwrap();
    assert_eq!(first.rates["USD"], 1.0);
    assert_eq!(first.rates["EUR"], 0.9);

    let second = app.rates.get_rate("USD").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(source.calls(), 1);
    assert_eq!(repository.history_len("USD"), 1);
}

#[tokio::test]
async fn get_rate_for_unknown_currency_is_not_found() {
    let source = Arc::new(StubSource::new(&["USD", "EUR"]));
    let (app, _) = app(source.clone());

    let err = app.rates.get_rate("ZZZ").await.unwrap_err();
    assert!(matches!(err, RateError::CurrencyNotFound(_)));
    assert!(err.is_not_found());
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn refresh_tolerates_partial_failure() {
    let source = Arc::new(StubSource::new(&["USD", "EUR", "GBP"]));
    source.fail("GBP");
    let (app, repository) = app(source.clone());

    let report = app.refresh.update_exchange_rates().await.unwrap();

    assert_eq!(report.refreshed.len(), 2);
    assert_eq!(report.failed, vec!["GBP".to_string()]);
    assert!(report.persisted);
    assert_eq!(repository.total(), 2);
    assert!(app.rate_cache.get("USD").is_some());
    assert!(app.rate_cache.get("EUR").is_some());
    assert!(app.rate_cache.get("GBP").is_none());

    // Served from the cache the refresh filled.
    let before = source.calls();
    app.rates.get_rate("EUR").await.unwrap();
    assert_eq!(source.calls(), before);
}

#[tokio::test]
async fn breaker_opens_under_sustained_failure() {
    let source = Arc::new(StubSource::new(&["USD", "EUR", "GBP", "JPY"]));
    source.fail_everything();
    let (app, _) = app(source.clone());

    for code in ["USD", "EUR", "GBP"] {
        let err = app.rates.get_rate(code).await.unwrap_err();
        assert!(err.is_unavailable());
    }
    assert_eq!(app.fetcher.breaker_state(), CircuitState::Open);
    let calls = source.calls();
    assert_eq!(calls, 6);

    let err = app.rates.get_rate("JPY").await.unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(source.calls(), calls);
}
