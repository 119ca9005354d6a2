//! Subscription service: CRUD plus the sync sweep that refreshes
//! availability and enqueues download jobs for newly available episodes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bus::EventBus;
use crate::catalogue::{self, EpisodeSource};
use crate::database::models::Subscription;
use crate::database::repositories::SubscriptionRepository;
use crate::database::time;
use crate::jobs::{CreateJobRequest, JobService};
use crate::utils::filename::sanitize_label;
use crate::{Error, Result};

/// How soon to re-check when new episodes are still unscheduled.
const RECHECK_SOON: i64 = 10; // minutes
/// Regular re-check interval when fully caught up.
const RECHECK_IDLE: i64 = 120; // minutes
/// Backoff after a failed fetch.
const RECHECK_AFTER_ERROR: i64 = 30; // minutes

/// Wire representation of a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub id: String,
    pub base_url: String,
    pub label: String,
    pub player: String,
    pub last_scheduled_episode: i64,
    pub last_downloaded_episode: i64,
    pub last_available_episode: i64,
    pub next_check_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Subscription> for SubscriptionDto {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id.clone(),
            base_url: sub.base_url.clone(),
            label: sub.label.clone(),
            player: sub.player.clone(),
            last_scheduled_episode: sub.last_scheduled_episode,
            last_downloaded_episode: sub.last_downloaded_episode,
            last_available_episode: sub.last_available_episode,
            next_check_at: time::parse_rfc3339(&sub.next_check_at),
            last_checked_at: (!sub.last_checked_at.is_empty())
                .then(|| time::parse_rfc3339(&sub.last_checked_at)),
            created_at: time::parse_rfc3339(&sub.created_at),
            updated_at: time::parse_rfc3339(&sub.updated_at),
        }
    }
}

/// Request body for creating a subscription.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub base_url: String,
    pub label: String,
    #[serde(default)]
    pub player: String,
}

/// Request body for updating a subscription. Absent fields are preserved.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateSubscriptionRequest {
    pub base_url: Option<String>,
    pub label: Option<String>,
    pub player: Option<String>,
    /// Manual rewind/advance of the scheduling counter is allowed.
    pub last_scheduled_episode: Option<i64>,
    /// Manual bootstrap of already-downloaded progress is allowed.
    pub last_downloaded_episode: Option<i64>,
}

/// Outcome of one sync sweep.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub subscription: SubscriptionDto,
    pub selected_player: String,
    pub max_available_episode: i64,
    pub enqueued_episodes: Vec<i64>,
    pub enqueued_job_ids: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Subscription service.
pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    jobs: Arc<JobService>,
    bus: Arc<EventBus>,
    source: Arc<dyn EpisodeSource>,
}

impl SubscriptionService {
    pub fn new(
        repo: Arc<dyn SubscriptionRepository>,
        jobs: Arc<JobService>,
        bus: Arc<EventBus>,
        source: Arc<dyn EpisodeSource>,
    ) -> Self {
        Self {
            repo,
            jobs,
            bus,
            source,
        }
    }

    pub async fn create(&self, req: CreateSubscriptionRequest) -> Result<SubscriptionDto> {
        let base_url = req.base_url.trim();
        let label = req.label.trim();
        if base_url.is_empty() {
            return Err(Error::validation("missing baseUrl"));
        }
        if label.is_empty() {
            return Err(Error::validation("missing label"));
        }
        let player = {
            let trimmed = req.player.trim();
            if trimmed.is_empty() { "auto" } else { trimmed }
        };

        let canon = catalogue::canonicalize_base_url(base_url)?;
        let created = self
            .repo
            .create(&Subscription::new(canon, label, player))
            .await?;
        self.publish("subscription.created", &created);
        Ok(SubscriptionDto::from(&created))
    }

    pub async fn get(&self, id: &str) -> Result<SubscriptionDto> {
        Ok(SubscriptionDto::from(&self.repo.get(id).await?))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<SubscriptionDto>> {
        let subs = self.repo.list(limit).await?;
        Ok(subs.iter().map(SubscriptionDto::from).collect())
    }

    pub async fn update(&self, id: &str, req: UpdateSubscriptionRequest) -> Result<SubscriptionDto> {
        let mut existing = self.repo.get(id).await?;

        if let Some(base_url) = &req.base_url
            && !base_url.trim().is_empty()
        {
            existing.base_url = catalogue::canonicalize_base_url(base_url)?;
        }
        if let Some(label) = &req.label
            && !label.trim().is_empty()
        {
            existing.label = label.trim().to_string();
        }
        if let Some(player) = &req.player
            && !player.trim().is_empty()
        {
            existing.player = player.trim().to_string();
        }
        if let Some(episode) = req.last_scheduled_episode {
            if episode < 0 {
                return Err(Error::validation("lastScheduledEpisode must be non-negative"));
            }
            existing.last_scheduled_episode = episode;
        }
        if let Some(episode) = req.last_downloaded_episode {
            if episode < 0 {
                return Err(Error::validation("lastDownloadedEpisode must be non-negative"));
            }
            existing.last_downloaded_episode = episode;
        }

        let updated = self.repo.update(&existing).await?;
        self.publish("subscription.updated", &updated);
        Ok(SubscriptionDto::from(&updated))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await?;
        self.bus
            .publish("subscription.deleted", json!({ "id": id }));
        Ok(())
    }

    /// One sweep: fetch the episode manifest, refresh availability and the
    /// next-check time, and (when `enqueue` is set) create download jobs for
    /// every newly available episode of the selected player.
    pub async fn sync_once(&self, id: &str, enqueue: bool) -> Result<SyncResult> {
        let mut sub = self.repo.get(id).await?;

        let manifest = match self.fetch_manifest(&sub.base_url).await {
            Ok(manifest) => manifest,
            Err(err) => {
                // Push the next check out and persist; the scheduler must
                // not be starved by transient fetch errors.
                let now = Utc::now();
                sub.last_checked_at = time::to_rfc3339(now);
                sub.next_check_at = time::to_rfc3339(now + Duration::minutes(RECHECK_AFTER_ERROR));
                let _ = self.repo.update(&sub).await;
                return Err(err);
            }
        };

        let mut selected = sub.player.trim().to_string();
        if selected.is_empty() || selected.eq_ignore_ascii_case("auto") {
            selected = catalogue::best_player(&manifest).unwrap_or_default().to_string();
        }
        let mut urls = manifest.player(&selected).unwrap_or_default();
        if urls.is_empty() {
            selected = catalogue::best_player(&manifest).unwrap_or_default().to_string();
            urls = manifest.player(&selected).unwrap_or_default();
        }

        let max_available = catalogue::max_available_episode(urls).max(0);

        let now = Utc::now();
        sub.last_available_episode = max_available;
        sub.last_checked_at = time::to_rfc3339(now);
        sub.next_check_at = if sub.last_scheduled_episode < max_available {
            time::to_rfc3339(now + Duration::minutes(RECHECK_SOON))
        } else {
            time::to_rfc3339(now + Duration::minutes(RECHECK_IDLE))
        };

        let mut enqueued_episodes = Vec::new();
        let mut enqueued_job_ids = Vec::new();
        if enqueue && sub.last_scheduled_episode < max_available {
            let label = sanitize_label(&sub.label);
            let from = sub.last_scheduled_episode + 1;
            for episode in from..=max_available {
                let Some(url) = urls.get(episode as usize - 1) else {
                    continue;
                };
                if url.trim().is_empty() {
                    continue;
                }

                let params = json!({
                    "url": url,
                    "path": format!("subscriptions/{}/{}-ep-{:02}.mp4", sub.id, label, episode),
                    "filename": "",
                    "subscriptionId": sub.id,
                    "episode": episode,
                    "source": "anime-sama",
                });

                match self
                    .jobs
                    .create(CreateJobRequest {
                        kind: "download".to_string(),
                        params,
                    })
                    .await
                {
                    Ok(created) => {
                        enqueued_episodes.push(episode);
                        enqueued_job_ids.push(created.id);
                        sub.last_scheduled_episode = episode;
                    }
                    // Stop on the first enqueue error; what already advanced
                    // is persisted below.
                    Err(err) => {
                        tracing::warn!(
                            subscription_id = %sub.id,
                            episode,
                            error = %err,
                            "failed to enqueue download job"
                        );
                        break;
                    }
                }
            }
        }

        let updated = self.repo.update(&sub).await?;
        self.publish("subscription.synced", &updated);

        Ok(SyncResult {
            subscription: SubscriptionDto::from(&updated),
            selected_player: selected,
            max_available_episode: max_available,
            enqueued_episodes,
            enqueued_job_ids,
            message: "note: episodes.js urls are host/embed urls; full video extraction is not implemented yet".to_string(),
        })
    }

    async fn fetch_manifest(&self, base_url: &str) -> Result<catalogue::EpisodeManifest> {
        let js = self.source.fetch_episodes_js(base_url).await?;
        catalogue::parse_episodes_js(&js)
    }

    fn publish(&self, topic: &str, sub: &Subscription) {
        if let Ok(payload) = serde_json::to_value(SubscriptionDto::from(sub)) {
            self.bus.publish(topic, payload);
        }
    }
}
