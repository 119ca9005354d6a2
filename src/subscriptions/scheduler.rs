//! Subscription scheduler: periodically sweeps due subscriptions through
//! the subscription service.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::service::SubscriptionService;
use crate::database::repositories::SubscriptionRepository;
use crate::database::time;

/// Periodic tick over due subscriptions.
pub struct SubscriptionScheduler {
    subs: Arc<SubscriptionService>,
    repo: Arc<dyn SubscriptionRepository>,

    pub tick_interval: Duration,
    pub batch_size: i64,
    pub enqueue: bool,
}

impl SubscriptionScheduler {
    pub fn new(subs: Arc<SubscriptionService>, repo: Arc<dyn SubscriptionRepository>) -> Self {
        Self {
            subs,
            repo,
            tick_interval: Duration::from_secs(60),
            batch_size: 10,
            enqueue: true,
        }
    }

    /// Run until `cancel` fires. Per-subscription errors are logged and
    /// never stop the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("subscription scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            self.tick(&cancel).await;
        }
    }

    /// One sweep: read up to `batch_size` due subscriptions in ascending
    /// due order and sync each.
    pub async fn tick(&self, cancel: &CancellationToken) {
        let limit = if self.batch_size > 0 { self.batch_size } else { 10 };

        let due = match self.repo.due(&time::now_rfc3339(), limit).await {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "scheduler due query failed");
                return;
            }
        };

        for sub in due {
            if cancel.is_cancelled() {
                return;
            }

            if let Err(err) = self.subs.sync_once(&sub.id, self.enqueue).await {
                warn!(subscription_id = %sub.id, error = %err, "subscription sync failed");
            }
        }
    }
}
