//! Construction of the long-lived service graph.
//!
//! Everything shared process-wide (caches, the circuit breaker inside the
//! fetcher, the services) is built once here and handed out by `Arc`.

use crate::api::{ExchangeRatesApi, RateSource};
use crate::config::AppConfig;
use crate::error::RateResult;
use crate::models::cache::EXCHANGE_RATES_CACHE;
use crate::models::{ExchangeRate, ExpiringCache, SharedCache};
use crate::repository::{
    CurrencyRepository, ExchangeRateRepository, InMemoryCurrencyRepository,
    InMemoryExchangeRateRepository,
};
use crate::services::{
    CurrencyService, ExchangeRateService, RefreshOrchestrator, RefreshScheduler, ResilientFetcher,
};
use std::sync::Arc;

pub struct App {
    pub config: AppConfig,
    pub currencies: Arc<CurrencyService>,
    pub rates: Arc<ExchangeRateService>,
    pub refresh: Arc<RefreshOrchestrator>,
    pub fetcher: Arc<ResilientFetcher>,
    pub rate_cache: SharedCache<String, ExchangeRate>,
}

impl App {
    /// Wire the service against the configured HTTP API and in-memory stores.
    pub fn new(config: AppConfig) -> RateResult<Self> {
        let source: Arc<dyn RateSource> = Arc::new(ExchangeRatesApi::new(&config.api)?);
        Ok(Self::with_parts(
            config,
            source,
            Arc::new(InMemoryCurrencyRepository::new()),
            Arc::new(InMemoryExchangeRateRepository::new()),
        ))
    }

    /// Wire the service from explicit collaborators.
    pub fn with_parts(
        config: AppConfig,
        source: Arc<dyn RateSource>,
        currency_repository: Arc<dyn CurrencyRepository>,
        rate_repository: Arc<dyn ExchangeRateRepository>,
    ) -> Self {
        let currencies = Arc::new(CurrencyService::new(
            currency_repository,
            Arc::clone(&source),
            config.cache.currencies_ttl,
        ));
        let fetcher = Arc::new(ResilientFetcher::new(
            source,
            &config.retry,
            config.circuit_breaker.clone(),
        ));
        let rate_cache: SharedCache<String, ExchangeRate> = Arc::new(ExpiringCache::new(
            EXCHANGE_RATES_CACHE,
            config.cache.exchange_rates_ttl,
        ));

        let rates = Arc::new(ExchangeRateService::new(
            currencies.clone(),
            Arc::clone(&rate_repository),
            Arc::clone(&fetcher),
            Arc::clone(&rate_cache),
            config.cache.staleness_window,
        ));
        let refresh = Arc::new(RefreshOrchestrator::new(
            currencies.clone(),
            rate_repository,
            Arc::clone(&fetcher),
            Arc::clone(&rate_cache),
            config.refresh.max_concurrency,
        ));

        Self {
            config,
            currencies,
            rates,
            refresh,
            fetcher,
            rate_cache,
        }
    }

    pub fn scheduler(&self) -> RefreshScheduler {
        RefreshScheduler::new(Arc::clone(&self.refresh), &self.config.refresh)
    }
}
