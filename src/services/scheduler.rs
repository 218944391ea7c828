use crate::config::RefreshConfig;
use crate::services::refresh::RefreshOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Periodically triggers a full refresh until told to stop.
pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    interval: Duration,
    initial_delay: Duration,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, config: &RefreshConfig) -> Self {
        Self {
            orchestrator,
            interval: config.interval,
            initial_delay: config.initial_delay,
        }
    }

    /// Run on a background task. Setting the watch value to `true` stops the
    /// loop between passes; a pass already running is finished first.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.initial_delay, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        info!("Starting scheduled exchange rate update");
                        match self.orchestrator.update_exchange_rates().await {
                            Ok(report) => info!(
                                refreshed = report.refreshed.len(),
                                failed = report.failed.len(),
                                "Exchange rates update completed"
                            ),
                            Err(e) => error!(error = %e, "Scheduled exchange rate update failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Refresh scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockRateSource;
    use crate::config::{CircuitBreakerConfig, RetryConfig};
    use crate::models::ExpiringCache;
    use crate::repository::{InMemoryCurrencyRepository, InMemoryExchangeRateRepository};
    use crate::services::currency_service::CurrencyService;
    use crate::services::fetcher::ResilientFetcher;

    #[tokio::test]
    async fn test_runs_passes_until_shutdown() {
        let source = Arc::new(MockRateSource::new());
        source.set_rates("USD", &[("USD", 1.0)]);
        let repository = Arc::new(InMemoryExchangeRateRepository::new());

        let orchestrator = Arc::new(RefreshOrchestrator::new(
            Arc::new(CurrencyService::new(
                Arc::new(InMemoryCurrencyRepository::new()),
                source.clone(),
                Duration::from_secs(60),
            )),
            repository.clone(),
            Arc::new(ResilientFetcher::new(
                source.clone(),
                &RetryConfig::default(),
                CircuitBreakerConfig::default(),
            )),
            Arc::new(ExpiringCache::new("exchange-rates", Duration::from_secs(60))),
            4,
        ));

        let config = RefreshConfig {
            interval: Duration::from_millis(20),
            initial_delay: Duration::ZERO,
            max_concurrency: 4,
        };
        let (tx, rx) = watch::channel(false);
        let handle = RefreshScheduler::new(orchestrator, &config).spawn(rx);

        tokio::time::sleep(Duration::from_millis(70)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(source.calls_for("USD") >= 2);
        assert!(repository.history_len("USD") >= 2);
    }
}
