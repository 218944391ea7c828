use crate::error::RateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency identified by its three-letter, upper-case code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency {
    code: String,
}

impl Currency {
    /// Build a currency from a trusted code, normalising its casing.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self {
            code: code.as_ref().trim().to_uppercase(),
        }
    }

    /// Validate user input: exactly three ASCII letters, any case.
    pub fn parse(code: &str) -> Result<Self, RateError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RateError::InvalidCurrencyCode(code.to_string()));
        }
        Ok(Self::new(trimmed))
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalises_case() {
        assert_eq!(Currency::new("usd").code(), "USD");
        assert_eq!(Currency::new(" eur ").to_string(), "EUR");
    }

    #[test]
    fn test_parse_rejects_bad_codes() {
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("USDT").is_err());
        assert!(Currency::parse("U5D").is_err());
        assert_eq!(Currency::parse("gbp").unwrap(), Currency::new("GBP"));
    }
}
