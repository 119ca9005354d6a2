//! Completion updater: closes the loop between finished download jobs and
//! subscription progress.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::service::SubscriptionDto;
use crate::bus::{Event, EventBus};
use crate::database::repositories::SubscriptionRepository;
use crate::jobs::JobDto;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DownloadJobMeta {
    subscription_id: String,
    episode: i64,
}

/// Bus listener that raises `lastDownloadedEpisode` on `job.completed`.
///
/// The repository write is a monotonic max, so out-of-order completions can
/// never regress progress.
pub struct DownloadCompletionUpdater {
    bus: Arc<EventBus>,
    subs: Arc<dyn SubscriptionRepository>,
}

impl DownloadCompletionUpdater {
    pub fn new(bus: Arc<EventBus>, subs: Arc<dyn SubscriptionRepository>) -> Self {
        Self { bus, subs }
    }

    /// Run until `cancel` fires or the bus closes.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut subscription = self.bus.subscribe();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("download completion updater stopped");
                    return;
                }
                event = subscription.recv() => {
                    let Some(event) = event else { return };
                    self.handle_event(event).await;
                }
            }
        }
    }

    async fn handle_event(&self, event: Event) {
        if event.topic != "job.completed" {
            return;
        }

        let Ok(job) = serde_json::from_value::<JobDto>(event.payload) else {
            return;
        };
        if job.kind != "download" {
            return;
        }

        let meta: DownloadJobMeta =
            serde_json::from_value(job.params).unwrap_or_default();
        let subscription_id = meta.subscription_id.trim();
        if subscription_id.is_empty() || meta.episode <= 0 {
            return;
        }

        let updated = match self
            .subs
            .mark_downloaded_episode_max(subscription_id, meta.episode)
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                warn!(
                    subscription_id,
                    episode = meta.episode,
                    error = %err,
                    "failed to mark episode downloaded"
                );
                return;
            }
        };

        if let Ok(payload) = serde_json::to_value(SubscriptionDto::from(&updated)) {
            self.bus.publish("subscription.downloaded", payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::database::models::Subscription;
    use crate::database::repositories::SqlxSubscriptionRepository;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        bus: Arc<EventBus>,
        repo: Arc<SqlxSubscriptionRepository>,
        cancel: CancellationToken,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let url = database::database_url_for_path(&dir.path().join("upd.db").to_string_lossy());
        let pool = database::init_pool(&url).await.unwrap();
        database::run_migrations(&pool).await.unwrap();

        let bus = Arc::new(EventBus::new());
        let repo = Arc::new(SqlxSubscriptionRepository::new(pool));
        let updater = DownloadCompletionUpdater::new(bus.clone(), repo.clone());

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        tokio::spawn(async move { updater.run(run_cancel).await });
        // Let the updater attach before events start flowing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        Fixture {
            _dir: dir,
            bus,
            repo,
            cancel,
        }
    }

    fn completed_download_event(subscription_id: &str, episode: i64) -> serde_json::Value {
        json!({
            "id": format!("job-{episode}"),
            "type": "download",
            "state": "completed",
            "progress": 1.0,
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z",
            "params": { "subscriptionId": subscription_id, "episode": episode },
        })
    }

    async fn wait_for_episode(
        repo: &SqlxSubscriptionRepository,
        id: &str,
        expected: i64,
    ) -> bool {
        for _ in 0..100 {
            let row = repo.get(id).await.unwrap();
            if row.last_downloaded_episode == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn completion_raises_progress_monotonically() {
        let fx = fixture().await;
        let sub = fx
            .repo
            .create(&Subscription::new(
                "https://anime-sama.si/catalogue/m/saison1/vostfr/",
                "M",
                "auto",
            ))
            .await
            .unwrap();

        fx.bus
            .publish("job.completed", completed_download_event(&sub.id, 3));
        assert!(wait_for_episode(&fx.repo, &sub.id, 3).await);

        // An out-of-order completion for an earlier episode is a no-op.
        fx.bus
            .publish("job.completed", completed_download_event(&sub.id, 2));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let row = fx.repo.get(&sub.id).await.unwrap();
        assert_eq!(row.last_downloaded_episode, 3);

        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn non_download_and_malformed_events_are_ignored() {
        let fx = fixture().await;
        let sub = fx
            .repo
            .create(&Subscription::new(
                "https://anime-sama.si/catalogue/n/saison1/vostfr/",
                "N",
                "auto",
            ))
            .await
            .unwrap();

        let mut noop_event = completed_download_event(&sub.id, 5);
        noop_event["type"] = json!("sleep");
        fx.bus.publish("job.completed", noop_event);

        let mut missing_meta = completed_download_event(&sub.id, 5);
        missing_meta["params"] = json!({});
        fx.bus.publish("job.completed", missing_meta);

        fx.bus
            .publish("job.started", completed_download_event(&sub.id, 5));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let row = fx.repo.get(&sub.id).await.unwrap();
        assert_eq!(row.last_downloaded_episode, 0);

        fx.cancel.cancel();
    }
}
