use crate::models::currency::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// One fetched snapshot of rates quoted against `currency`.
///
/// Snapshots are never mutated; a later fetch supersedes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: Currency,
    pub rates: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(currency: Currency, rates: HashMap<String, f64>) -> Self {
        Self::at(currency, rates, Utc::now())
    }

    pub fn at(currency: Currency, rates: HashMap<String, f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            currency,
            rates,
            timestamp,
        }
    }

    pub fn rate_for(&self, code: &str) -> Option<f64> {
        self.rates.get(&code.to_uppercase()).copied()
    }

    /// A snapshot is valid only when it quotes its own currency.
    pub fn has_self_rate(&self) -> bool {
        self.rates.contains_key(self.currency.code())
    }

    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Strictly older than `window`.
    pub fn is_older_than(&self, window: Duration) -> bool {
        self.age() > window
    }
}
