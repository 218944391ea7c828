//! Bulk refresh of every tracked currency.

use crate::error::RateResult;
use crate::models::{ExchangeRate, SharedCache};
use crate::repository::ExchangeRateRepository;
use crate::services::currency_service::CurrencyDirectory;
use crate::services::fetcher::ResilientFetcher;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Codes refreshed, in completion order.
    pub refreshed: Vec<String>,
    /// Codes whose fetch failed this pass.
    pub failed: Vec<String>,
    /// Whether a batch was handed to persistence.
    pub persisted: bool,
    pub elapsed: Duration,
}

impl RefreshReport {
    /// Nothing succeeded, so nothing was persisted.
    pub fn is_empty(&self) -> bool {
        self.refreshed.is_empty()
    }
}

/// Refreshes the rate cache for the whole catalogue in one pass.
///
/// One task is spawned per currency and a semaphore caps how many fetch at
/// once. A failed currency is logged and left out; its previous cache entry
/// stays servable. Tasks are not cancelled if the caller stops waiting.
pub struct RefreshOrchestrator {
    currencies: Arc<dyn CurrencyDirectory>,
    repository: Arc<dyn ExchangeRateRepository>,
    fetcher: Arc<ResilientFetcher>,
    cache: SharedCache<String, ExchangeRate>,
    max_concurrency: usize,
}

impl RefreshOrchestrator {
    pub fn new(
        currencies: Arc<dyn CurrencyDirectory>,
        repository: Arc<dyn ExchangeRateRepository>,
        fetcher: Arc<ResilientFetcher>,
        cache: SharedCache<String, ExchangeRate>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            currencies,
            repository,
            fetcher,
            cache,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run one pass. Per-currency failures never fail the pass; a
    /// persistence failure does, after the cache has already been updated.
    pub async fn update_exchange_rates(&self) -> RateResult<RefreshReport> {
        let started = Instant::now();
        let currencies = self.currencies.list_all().await?;
        info!(
            currencies = currencies.len(),
            max_concurrency = self.max_concurrency,
            "Refreshing exchange rates"
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let results: Arc<Mutex<Vec<ExchangeRate>>> =
            Arc::new(Mutex::new(Vec::with_capacity(currencies.len())));

        let mut codes = Vec::with_capacity(currencies.len());
        let mut tasks = Vec::with_capacity(currencies.len());

        for currency in currencies {
            let permits = Arc::clone(&permits);
            let fetcher = Arc::clone(&self.fetcher);
            let cache = Arc::clone(&self.cache);
            let results = Arc::clone(&results);
            codes.push(currency.code().to_string());

            tasks.push(tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return false,
                };

                match fetcher.fetch(&currency).await {
                    Ok(rate) => {
                        cache.insert(currency.code().to_string(), rate.clone());
                        results.lock().push(rate);
                        true
                    }
                    Err(e) => {
                        error!(currency = %currency, error = %e, "Error fetching exchange rate");
                        false
                    }
                }
            }));
        }

        let mut failed = Vec::new();
        for (code, outcome) in codes.into_iter().zip(join_all(tasks).await) {
            match outcome {
                Ok(true) => {}
                Ok(false) => failed.push(code),
                Err(e) => {
                    error!(currency = %code, error = %e, "Refresh task aborted");
                    failed.push(code);
                }
            }
        }

        let rates = std::mem::take(&mut *results.lock());
        let refreshed: Vec<String> = rates
            .iter()
            .map(|rate| rate.currency.code().to_string())
            .collect();

        let mut report = RefreshReport {
            refreshed,
            failed,
            persisted: false,
            elapsed: Duration::ZERO,
        };

        if rates.is_empty() {
            warn!(failed = report.failed.len(), "No exchange rates were fetched successfully");
        } else {
            self.repository.save_all(&rates).await?;
            report.persisted = true;
        }

        report.elapsed = started.elapsed();
        info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            persisted = report.persisted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Exchange rate refresh finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockRateSource;
    use crate::config::{CircuitBreakerConfig, RetryConfig};
    use crate::error::{RateError, RepositoryError};
    use crate::models::{Currency, ExpiringCache};
    use crate::repository::{InMemoryCurrencyRepository, InMemoryExchangeRateRepository};
    use crate::services::currency_service::CurrencyService;
    use async_trait::async_trait;

    struct FailingRepository;

    #[async_trait]
    impl ExchangeRateRepository for FailingRepository {
        async fn save_all(&self, _rates: &[ExchangeRate]) -> Result<(), RepositoryError> {
            Err(RepositoryError::Storage("disk full".to_string()))
        }

        async fn latest_for(
            &self,
            _currency: &Currency,
        ) -> Result<Option<ExchangeRate>, RepositoryError> {
            Ok(None)
        }
    }

    fn source() -> Arc<MockRateSource> {
        let source = Arc::new(MockRateSource::new());
        source.set_rates("USD", &[("USD", 1.0), ("EUR", 0.9)]);
        source.set_rates("EUR", &[("EUR", 1.0), ("USD", 1.1)]);
        source.set_rates("GBP", &[("GBP", 1.0), ("USD", 1.27)]);
        source
    }

    fn orchestrator(
        source: Arc<MockRateSource>,
        repository: Arc<dyn ExchangeRateRepository>,
        cache: SharedCache<String, ExchangeRate>,
    ) -> RefreshOrchestrator {
        let currencies = Arc::new(CurrencyService::new(
            Arc::new(InMemoryCurrencyRepository::new()),
            source.clone(),
            Duration::from_secs(60),
        ));
        let fetcher = Arc::new(ResilientFetcher::new(
            source,
            &RetryConfig {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                ..Default::default()
            },
            CircuitBreakerConfig::default(),
        ));
        RefreshOrchestrator::new(currencies, repository, fetcher, cache, 2)
    }

    fn cache() -> SharedCache<String, ExchangeRate> {
        Arc::new(ExpiringCache::new("exchange-rates", Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let source = source();
        source.fail_next("GBP", 10);
        let repository = Arc::new(InMemoryExchangeRateRepository::new());
        let cache = cache();

        let previous_gbp = ExchangeRate::new(
            Currency::new("GBP"),
            [("GBP".to_string(), 1.0), ("USD".to_string(), 1.25)]
                .into_iter()
                .collect(),
        );
        cache.insert("GBP".to_string(), previous_gbp.clone());

        let report = orchestrator(source.clone(), repository.clone(), cache.clone())
            .update_exchange_rates()
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["GBP".to_string()]);
        let mut refreshed = report.refreshed.clone();
        refreshed.sort();
        assert_eq!(refreshed, vec!["EUR".to_string(), "USD".to_string()]);
        assert!(report.persisted);

        assert_eq!(repository.total(), 2);
        assert_eq!(repository.history_len("GBP"), 0);
        assert_eq!(cache.get("USD").unwrap().rate_for("EUR"), Some(0.9));
        assert_eq!(cache.get("EUR").unwrap().rate_for("USD"), Some(1.1));
        assert_eq!(cache.get("GBP"), Some(previous_gbp));
        assert_eq!(source.calls_for("GBP"), 2);
    }

    #[tokio::test]
    async fn test_no_results_skips_persistence() {
        let source = source();
        source.fail_always(true);
        let repository = Arc::new(InMemoryExchangeRateRepository::new());

        let report = orchestrator(source, repository.clone(), cache())
            .update_exchange_rates()
            .await
            .unwrap();

        assert!(report.is_empty());
        assert!(!report.persisted);
        assert_eq!(report.failed.len(), 3);
        assert_eq!(repository.total(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_pass_but_keeps_cache() {
        let cache = cache();
        let err = orchestrator(source(), Arc::new(FailingRepository), cache.clone())
            .update_exchange_rates()
            .await
            .unwrap_err();

        assert!(matches!(err, RateError::Persistence(_)));
        assert!(cache.get("USD").is_some());
        assert!(cache.get("EUR").is_some());
        assert!(cache.get("GBP").is_some());
    }

    #[tokio::test]
    async fn test_abandoned_wait_leaves_fetches_running() {
        let source = source();
        source.set_delay(Duration::from_millis(50));
        let repository = Arc::new(InMemoryExchangeRateRepository::new());
        let cache = cache();
        let orchestrator = orchestrator(source.clone(), repository.clone(), cache.clone());

        let waited =
            tokio::time::timeout(Duration::from_millis(10), orchestrator.update_exchange_rates()).await;
        assert!(waited.is_err());
        assert!(cache.is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;

        for code in ["USD", "EUR", "GBP"] {
            assert!(cache.get(code).is_some(), "{} was not cached", code);
        }
        // The batch write belonged to the abandoned wait.
        assert_eq!(repository.total(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_large_catalog_with_bounded_pool() {
        let source = Arc::new(MockRateSource::new());
        let codes: Vec<String> = (0..40u8)
            .map(|i| format!("X{}{}", (b'A' + i / 26) as char, (b'A' + i % 26) as char))
            .collect();
        for code in &codes {
            source.set_rates(code, &[(code.as_str(), 1.0)]);
        }
        let repository = Arc::new(InMemoryExchangeRateRepository::new());
        let cache = cache();

        let report = orchestrator(source.clone(), repository.clone(), cache.clone())
            .update_exchange_rates()
            .await
            .unwrap();

        assert_eq!(report.refreshed.len(), codes.len());
        assert!(report.failed.is_empty());
        assert_eq!(repository.total(), codes.len());
        assert_eq!(cache.len(), codes.len());
    }
}
