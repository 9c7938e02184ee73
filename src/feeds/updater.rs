//! Background refresh scheduler.
//!
//! Periodically refreshes the enabled sources whose fetch interval has
//! elapsed.

use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::fetcher::FetcherResolver;
use super::repository::{ItemRepository, SourceRepository};
use super::service::{IngestionService, RefreshReport};
use crate::config::IngestConfig;
use crate::db::Database;
use crate::Result;

/// Feed refresh scheduler.
pub struct FeedUpdater {
    db: Arc<Database>,
    resolver: Arc<dyn FetcherResolver>,
    config: IngestConfig,
    check_interval: Duration,
}

impl FeedUpdater {
    /// Create an updater ticking every `config.update_interval_secs`.
    pub fn new(db: Arc<Database>, resolver: Arc<dyn FetcherResolver>, config: IngestConfig) -> Self {
        // tokio's interval panics on a zero period
        let check_interval = Duration::from_secs(config.update_interval_secs.max(1));
        Self {
            db,
            resolver,
            config,
            check_interval,
        }
    }

    /// Interval between refresh passes.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run the updater loop. Never returns; cancel by dropping the future.
    pub async fn run(&self) {
        info!(
            "Feed updater started (check interval: {} seconds)",
            self.check_interval.as_secs()
        );

        let mut timer = interval(self.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            if let Err(e) = self.tick().await {
                error!("Feed refresh pass failed: {}", e);
            }
        }
    }

    /// Refresh every due source once.
    pub async fn tick(&self) -> Result<RefreshReport> {
        debug!("Checking for sources due for refresh");

        let service = IngestionService::new(
            SourceRepository::new(self.db.pool()),
            ItemRepository::new(self.db.pool()),
            Arc::clone(&self.resolver),
            self.config.clone(),
        );
        let report = service.refresh_due().await?;

        if report.attempted() > 0 {
            info!(
                "Refreshed {} source(s): {} new item(s), {} failure(s)",
                report.attempted(),
                report.new_items,
                report.failures.len()
            );
        }
        for failure in &report.failures {
            warn!("Source {} failed: {}", failure.slug, failure.error);
        }

        Ok(report)
    }
}
