use exchange_rates::{App, AppConfig};
use exchange_rates::utils::display::DisplayFormatter;
use std::error::Error;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting exchange rate service");

    let config = AppConfig::from_env()?;
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    if config.api.access_key.is_empty() {
        warn!("EXCHANGE_API_ACCESS_KEY is not set, upstream calls will likely fail");
    }

    let app = App::new(config)?;
    let display = DisplayFormatter::new(app.config.cache.staleness_window);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = app.scheduler().spawn(shutdown_rx);

    println!("=== Exchange Rate Service ===");
    println!("Commands:");
    println!("  <code>       - Show rates for a currency (e.g. USD)");
    println!("  list         - Show tracked currencies");
    println!("  add <code>   - Track a new currency");
    println!("  refresh      - Refresh all rates now");
    println!("  exit         - Exit the program");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        let mut parts = command.split_whitespace();

        match (parts.next(), parts.next()) {
            (None, _) => continue,
            (Some("exit"), _) => {
                debug!("Received exit command");
                break;
            }
            (Some("list"), _) => match app.currencies.get_all_currencies().await {
                Ok(currencies) => println!("{}", display.format_currency_list(&currencies)),
                Err(e) => println!("Error: {}", e),
            },
            (Some("add"), Some(code)) => match app.currencies.add_currency(code).await {
                Ok(currency) => println!("Tracking {}", currency),
                Err(e) => println!("Error: {}", e),
            },
            (Some("add"), None) => println!("Usage: add <code>"),
            (Some("refresh"), _) => match app.refresh.update_exchange_rates().await {
                Ok(report) => println!(
                    "{}",
                    display.format_refresh_report(&report, app.fetcher.breaker_state())
                ),
                Err(e) => println!("Error: {}", e),
            },
            (Some(code), None) => {
                debug!("Fetching rates for code: {}", code);
                match app.rates.get_rate(code).await {
                    Ok(rate) => println!("{}", display.format_exchange_rate(&rate)),
                    Err(e) if e.is_not_found() => println!("Not found: {}", e),
                    Err(e) => {
                        println!("Service unavailable: {}", e);
                        let mut cause = e.source();
                        while let Some(inner) = cause {
                            println!("  caused by: {}", inner);
                            cause = inner.source();
                        }
                    }
                }
            }
            (Some(other), Some(_)) => println!("Unknown command: {}", other),
        }
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        error!(error = %e, "Scheduler task ended abnormally");
    }
    Ok(())
}
