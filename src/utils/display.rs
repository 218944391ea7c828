use crate::models::{Currency, ExchangeRate};
use crate::services::{CircuitState, RefreshReport};
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use std::time::Duration;

pub struct DisplayFormatter {
    /// Snapshots older than this are shown as stale.
    fresh_for: Duration,
}

impl DisplayFormatter {
    pub fn new(fresh_for: Duration) -> Self {
        Self { fresh_for }
    }

    pub fn format_header(&self, text: &str) -> String {
        format!("\n=== {} ===", text.bright_white().bold())
    }

    pub fn format_table(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

        table.add_row(Row::new(
            headers.iter().map(|h| Cell::new(h).style_spec("b")).collect(),
        ));

        for row in rows {
            table.add_row(Row::new(row.iter().map(|cell| Cell::new(cell)).collect()));
        }

        table.to_string()
    }

    pub fn format_rate(&self, rate: f64) -> String {
        if rate >= 1.0 {
            format!("{:.4}", rate)
        } else {
            format!("{:.6}", rate)
        }
    }

    pub fn format_age(&self, age: Duration) -> String {
        let secs = age.as_secs();
        let text = if secs < 60 {
            format!("{}s ago", secs)
        } else if secs < 3600 {
            format!("{}m ago", secs / 60)
        } else {
            format!("{}h ago", secs / 3600)
        };

        if age <= self.fresh_for {
            text.green().to_string()
        } else {
            text.red().to_string()
        }
    }

    /// Rates sorted by quote code.
    pub fn format_exchange_rate(&self, rate: &ExchangeRate) -> String {
        let mut quotes: Vec<(&String, &f64)> = rate.rates.iter().collect();
        quotes.sort_by(|a, b| a.0.cmp(b.0));

        let rows: Vec<Vec<String>> = quotes
            .into_iter()
            .map(|(code, value)| vec![code.clone(), self.format_rate(*value)])
            .collect();

        let mut output = Vec::new();
        output.push(self.format_header(&format!("1 {}", rate.currency)));
        output.push(format!(
            "Updated: {} ({})",
            rate.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.format_age(rate.age())
        ));
        output.push(self.format_table(&["Currency", "Rate"], &rows));
        output.join("\n")
    }

    pub fn format_currency_list(&self, currencies: &[Currency]) -> String {
        let codes: Vec<&str> = currencies.iter().map(|c| c.code()).collect();
        let mut output = vec![self.format_header(&format!("{} Currencies", codes.len()))];
        for line in codes.chunks(12) {
            output.push(line.join(" "));
        }
        output.join("\n")
    }

    pub fn format_refresh_report(&self, report: &RefreshReport, breaker: CircuitState) -> String {
        let mut output = vec![self.format_header("Refresh")];
        output.push(format!(
            "Refreshed: {}",
            report.refreshed.len().to_string().green()
        ));
        if report.failed.is_empty() {
            output.push("Failed: 0".to_string());
        } else {
            output.push(format!(
                "Failed: {} ({})",
                report.failed.len().to_string().red(),
                report.failed.join(", ")
            ));
        }
        output.push(format!("Persisted: {}", report.persisted));
        output.push(format!("Elapsed: {} ms", report.elapsed.as_millis()));
        output.push(format!("Circuit breaker: {}", breaker));
        output.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_exchange_rate_lists_sorted_quotes() {
        colored::control::set_override(false);
        let formatter = DisplayFormatter::new(Duration::from_secs(3600));
        let rate = ExchangeRate::new(
            Currency::new("USD"),
            [("USD".to_string(), 1.0), ("EUR".to_string(), 0.9)]
                .into_iter()
                .collect(),
        );

        let text = formatter.format_exchange_rate(&rate);
        let eur = text.find("EUR").unwrap();
        let usd = text.rfind("USD").unwrap();
        assert!(eur < usd);
        assert!(text.contains("0.900000"));
        assert!(text.contains("1.0000"));
    }

    #[test]
    fn test_format_age_units() {
        colored::control::set_override(false);
        let formatter = DisplayFormatter::new(Duration::from_secs(3600));
        assert_eq!(formatter.format_age(Duration::from_secs(5)), "5s ago");
        assert_eq!(formatter.format_age(Duration::from_secs(120)), "2m ago");
        assert_eq!(formatter.format_age(Duration::from_secs(7200)), "2h ago");
    }
}
