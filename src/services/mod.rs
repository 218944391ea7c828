pub mod circuit_breaker;
pub mod currency_service;
pub mod fetcher;
pub mod rate_service;
pub mod refresh;
pub mod scheduler;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use currency_service::{CurrencyDirectory, CurrencyService};
pub use fetcher::{Fallback, ResilientFetcher, RetryPolicy};
pub use rate_service::ExchangeRateService;
pub use refresh::{RefreshOrchestrator, RefreshReport};
pub use scheduler::RefreshScheduler;
