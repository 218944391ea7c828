use crate::error::{RateError, RateResult};
use crate::models::{Currency, ExchangeRate, SharedCache};
use crate::repository::ExchangeRateRepository;
use crate::services::currency_service::CurrencyDirectory;
use crate::services::fetcher::ResilientFetcher;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Read path for exchange rates.
///
/// A cache miss is resolved inline on the caller's task: the latest persisted
/// snapshot is reused while it is younger than the staleness window,
/// otherwise a fresh one is fetched and persisted.
pub struct ExchangeRateService {
    currencies: Arc<dyn CurrencyDirectory>,
    repository: Arc<dyn ExchangeRateRepository>,
    fetcher: Arc<ResilientFetcher>,
    cache: SharedCache<String, ExchangeRate>,
    staleness_window: Duration,
}

impl ExchangeRateService {
    pub fn new(
        currencies: Arc<dyn CurrencyDirectory>,
        repository: Arc<dyn ExchangeRateRepository>,
        fetcher: Arc<ResilientFetcher>,
        cache: SharedCache<String, ExchangeRate>,
        staleness_window: Duration,
    ) -> Self {
        Self {
            currencies,
            repository,
            fetcher,
            cache,
            staleness_window,
        }
    }

    pub async fn get_rate(&self, code: &str) -> RateResult<ExchangeRate> {
        let currency = self
            .currencies
            .find_by_code(code)
            .await?
            .ok_or_else(|| RateError::CurrencyNotFound(code.to_string()))?;

        self.cache
            .get_or_compute(currency.code().to_string(), || self.load_rate(&currency))
            .await
            .map_err(|source| RateError::RateUnavailable {
                code: currency.code().to_string(),
                source,
            })
    }

    async fn load_rate(&self, currency: &Currency) -> RateResult<ExchangeRate> {
        if let Some(latest) = self.repository.latest_for(currency).await? {
            if !latest.is_older_than(self.staleness_window) {
                debug!(currency = %currency, "Reusing persisted exchange rate");
                return Ok(latest);
            }
        }

        let fetched = self.fetcher.fetch(currency).await?;
        self.repository.save_all(slice::from_ref(&fetched)).await?;
        info!(currency = %currency, "Fetched and stored exchange rate");
        Ok(fetched)
    }
}
