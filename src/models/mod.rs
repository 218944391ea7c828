pub mod cache;
pub mod currency;
pub mod exchange_rate;

pub use cache::{ExpiringCache, SharedCache};
pub use currency::Currency;
pub use exchange_rate::ExchangeRate;
