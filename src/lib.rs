pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

// Re-export commonly used items
pub use app::App;
pub use config::AppConfig;
pub use error::{RateError, RateResult};
pub use models::{Currency, ExchangeRate, ExpiringCache};
pub use services::{CurrencyService, ExchangeRateService, RefreshOrchestrator, RefreshReport};
