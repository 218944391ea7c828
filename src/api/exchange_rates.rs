use crate::api::RateSource;
use crate::config::ApiConfig;
use crate::error::SourceError;
use crate::models::{Currency, ExchangeRate};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error};

/// HTTP client for an exchangeratesapi.io-style endpoint.
pub struct ExchangeRatesApi {
    client: Client,
    rates_url: String,
    symbols_url: String,
    access_key: String,
}

impl ExchangeRatesApi {
    pub fn new(config: &ApiConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            rates_url: config.rates_url.clone(),
            symbols_url: config.symbols_url.clone(),
            access_key: config.access_key.clone(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        debug!(url = %url, "Sending request");
        let response = self
            .client
            .get(url)
            .query(&[("access_key", self.access_key.as_str())])
            .query(query)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            debug!(url = %url, "Rate limit hit");
            return Err(SourceError::Api("Rate limit reached".to_string()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RateSource for ExchangeRatesApi {
    fn name(&self) -> &str {
        "exchangeratesapi"
    }

    async fn fetch_rates(&self, currency: &Currency) -> Result<ExchangeRate, SourceError> {
        let json = self
            .get_json(&self.rates_url, &[("base", currency.code())])
            .await?;
        parse_rates(currency, &json)
    }

    async fn fetch_symbols(&self) -> Result<Vec<Currency>, SourceError> {
        let json = self.get_json(&self.symbols_url, &[]).await?;
        let symbols = parse_symbols(&json)?;
        debug!("Parsed {} currency symbols from response", symbols.len());
        Ok(symbols)
    }
}

fn error_message(json: &Value) -> String {
    json.get("error")
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown error".to_string())
}

fn is_success(json: &Value) -> bool {
    json.get("success").and_then(|s| s.as_bool()).unwrap_or(false)
}

/// Turn a `latest` response into a snapshot, requiring the base's own rate.
pub(crate) fn parse_rates(currency: &Currency, json: &Value) -> Result<ExchangeRate, SourceError> {
    if !is_success(json) {
        let message = error_message(json);
        error!(currency = %currency, error = %message, "External API error");
        return Err(SourceError::Api(message));
    }

    let rates: HashMap<String, f64> = json
        .get("rates")
        .and_then(|r| r.as_object())
        .map(|object| {
            object
                .iter()
                .filter_map(|(code, value)| value.as_f64().map(|v| (code.to_uppercase(), v)))
                .collect()
        })
        .unwrap_or_default();

    let rate = ExchangeRate::new(currency.clone(), rates);
    if !rate.has_self_rate() {
        error!(currency = %currency, "Rates not found for currency");
        return Err(SourceError::MissingSelfRate(currency.code().to_string()));
    }
    Ok(rate)
}

/// Turn a `symbols` response into the currency list, sorted by code.
pub(crate) fn parse_symbols(json: &Value) -> Result<Vec<Currency>, SourceError> {
    if !is_success(json) {
        return Err(SourceError::Api(format!(
            "Failed to fetch currency symbols: {}",
            error_message(json)
        )));
    }

    let symbols = json
        .get("symbols")
        .and_then(|s| s.as_object())
        .ok_or_else(|| SourceError::Malformed("Expected a symbols object".to_string()))?;

    let mut currencies: Vec<Currency> = symbols.keys().map(Currency::new).collect();
    currencies.sort();
    Ok(currencies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rates_success() {
        let body = json!({
            "success": true,
            "base": "USD",
            "rates": { "USD": 1.0, "EUR": 0.9, "GBP": 0.78 }
        });

        let rate = parse_rates(&Currency::new("USD"), &body).unwrap();
        assert_eq!(rate.currency.code(), "USD");
        assert_eq!(rate.rate_for("USD"), Some(1.0));
        assert_eq!(rate.rates.len(), 3);
    }

    #[test]
    fn test_parse_rates_requires_self_rate() {
        let body = json!({ "success": true, "rates": { "EUR": 0.9 } });

        let err = parse_rates(&Currency::new("USD"), &body).unwrap_err();
        assert!(matches!(err, SourceError::MissingSelfRate(code) if code == "USD"));
    }

    #[test]
    fn test_parse_rates_api_error() {
        let body = json!({
            "success": false,
            "error": { "code": 105, "type": "base_currency_access_restricted" }
        });

        let err = parse_rates(&Currency::new("USD"), &body).unwrap_err();
        match err {
            SourceError::Api(message) => assert!(message.contains("base_currency_access_restricted")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_parse_symbols() {
        let body = json!({
            "success": true,
            "symbols": { "usd": "United States Dollar", "EUR": "Euro" }
        });

        let symbols = parse_symbols(&body).unwrap();
        assert_eq!(symbols, vec![Currency::new("EUR"), Currency::new("USD")]);
    }

    #[test]
    fn test_parse_symbols_missing_object() {
        let body = json!({ "success": true });
        assert!(matches!(parse_symbols(&body), Err(SourceError::Malformed(_))));
    }
}
