use crate::api::RateSource;
use crate::error::{RateError, RateResult};
use crate::models::cache::{ExpiringCache, CURRENCIES_CACHE};
use crate::models::Currency;
use crate::repository::CurrencyRepository;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const ALL_CURRENCIES: &str = "all";

/// Read side of the currency catalogue, as seen by the rate services.
#[async_trait]
pub trait CurrencyDirectory: Send + Sync {
    async fn list_all(&self) -> RateResult<Vec<Currency>>;

    async fn find_by_code(&self, code: &str) -> RateResult<Option<Currency>>;
}

/// Currency catalogue backed by a repository and read through a cache.
pub struct CurrencyService {
    repository: Arc<dyn CurrencyRepository>,
    source: Arc<dyn RateSource>,
    cache: ExpiringCache<&'static str, Vec<Currency>>,
}

impl CurrencyService {
    pub fn new(
        repository: Arc<dyn CurrencyRepository>,
        source: Arc<dyn RateSource>,
        ttl: Duration,
    ) -> Self {
        Self {
            repository,
            source,
            cache: ExpiringCache::new(CURRENCIES_CACHE, ttl),
        }
    }

    /// Every known currency. The first read against an empty repository
    /// pulls the catalogue from the rate source.
    pub async fn get_all_currencies(&self) -> RateResult<Vec<Currency>> {
        self.cache
            .get_or_compute(ALL_CURRENCIES, || self.load_catalog())
            .await
            .map_err(RateError::CatalogUnavailable)
    }

    /// Fetch the upstream symbol list and store it.
    pub async fn initialize_currencies(&self) -> RateResult<usize> {
        let currencies = self.source.fetch_symbols().await?;
        let count = currencies.len();
        self.repository.save_all(currencies).await?;
        info!(count, source = self.source.name(), "Initialized currency catalogue");
        Ok(count)
    }

    /// Add a currency, or return the existing one.
    pub async fn add_currency(&self, code: &str) -> RateResult<Currency> {
        let currency = Currency::parse(code)?;
        let stored = match self.repository.find_by_code(currency.code()).await? {
            Some(existing) => existing,
            None => {
                info!(currency = %currency, "Adding currency");
                self.repository.save(currency).await?
            }
        };
        self.evict_currencies_cache();
        Ok(stored)
    }

    pub async fn get_currency_by_code(&self, code: &str) -> RateResult<Currency> {
        self.find_by_code(code)
            .await?
            .ok_or_else(|| RateError::CurrencyNotFound(code.to_string()))
    }

    pub fn evict_currencies_cache(&self) {
        if self.cache.invalidate() {
            debug!("Currency cache evicted");
        }
    }

    async fn load_catalog(&self) -> RateResult<Vec<Currency>> {
        if self.repository.count().await? == 0 {
            self.initialize_currencies().await?;
        }
        Ok(self.repository.find_all().await?)
    }
}

#[async_trait]
impl CurrencyDirectory for CurrencyService {
    async fn list_all(&self) -> RateResult<Vec<Currency>> {
        self.get_all_currencies().await
    }

    async fn find_by_code(&self, code: &str) -> RateResult<Option<Currency>> {
        if self.repository.count().await? == 0 {
            self.get_all_currencies().await?;
        }
        let normalized = code.trim().to_uppercase();
        Ok(self.repository.find_by_code(&normalized).await?)
    }
}
