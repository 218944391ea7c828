//! Persistence seams for currencies and exchange rate snapshots.
//!
//! Only in-memory stores ship with the crate; anything durable plugs in
//! behind the same traits.

use crate::error::RepositoryError;
use crate::models::{Currency, ExchangeRate};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

#[async_trait]
pub trait CurrencyRepository: Send + Sync {
    async fn count(&self) -> Result<usize, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<Currency>, RepositoryError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Currency>, RepositoryError>;

    async fn save(&self, currency: Currency) -> Result<Currency, RepositoryError>;

    async fn save_all(&self, currencies: Vec<Currency>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExchangeRateRepository: Send + Sync {
    /// Persist a batch of snapshots in one call.
    async fn save_all(&self, rates: &[ExchangeRate]) -> Result<(), RepositoryError>;

    /// Most recent snapshot for `currency`, by timestamp.
    async fn latest_for(&self, currency: &Currency) -> Result<Option<ExchangeRate>, RepositoryError>;
}

/// Currency catalogue kept in memory.
#[derive(Default)]
pub struct InMemoryCurrencyRepository {
    currencies: DashMap<String, Currency>,
}

impl InMemoryCurrencyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CurrencyRepository for InMemoryCurrencyRepository {
    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.currencies.len())
    }

    async fn find_all(&self) -> Result<Vec<Currency>, RepositoryError> {
        let mut all: Vec<Currency> = self.currencies.iter().map(|c| c.value().clone()).collect();
        all.sort();
        Ok(all)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Currency>, RepositoryError> {
        Ok(self.currencies.get(code).map(|c| c.value().clone()))
    }

    async fn save(&self, currency: Currency) -> Result<Currency, RepositoryError> {
        self.currencies
            .insert(currency.code().to_string(), currency.clone());
        Ok(currency)
    }

    async fn save_all(&self, currencies: Vec<Currency>) -> Result<(), RepositoryError> {
        for currency in currencies {
            self.currencies.insert(currency.code().to_string(), currency);
        }
        Ok(())
    }
}

/// Snapshots kept per currency by [`InMemoryExchangeRateRepository::new`].
pub const DEFAULT_HISTORY_LIMIT: usize = 24;

/// Snapshot history kept in memory, per currency, newest last. Only the
/// most recent `history_limit` snapshots of each currency are retained.
pub struct InMemoryExchangeRateRepository {
    history: DashMap<String, VecDeque<ExchangeRate>>,
    history_limit: usize,
}

impl Default for InMemoryExchangeRateRepository {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryExchangeRateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            history: DashMap::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Number of snapshots stored for `code`.
    pub fn history_len(&self, code: &str) -> usize {
        self.history.get(code).map(|h| h.len()).unwrap_or(0)
    }

    /// Number of snapshots stored overall.
    pub fn total(&self) -> usize {
        self.history.iter().map(|h| h.len()).sum()
    }
}

#[async_trait]
impl ExchangeRateRepository for InMemoryExchangeRateRepository {
    async fn save_all(&self, rates: &[ExchangeRate]) -> Result<(), RepositoryError> {
        for rate in rates {
            let mut history = self
                .history
                .entry(rate.currency.code().to_string())
                .or_default();
            history.push_back(rate.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }
        debug!(count = rates.len(), "Saved exchange rates");
        Ok(())
    }

    async fn latest_for(&self, currency: &Currency) -> Result<Option<ExchangeRate>, RepositoryError> {
        Ok(self.history.get(currency.code()).and_then(|history| {
            history
                .iter()
                .max_by_key(|rate| rate.timestamp)
                .cloned()
        }))
    }
}
