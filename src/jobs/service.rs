//! Job service: DTO shaping, creation, listing, and the cancellation
//! cascade over the repository, with bus notifications.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::EventBus;
use crate::database::models::{Job, JobState};
use crate::database::repositories::JobRepository;
use crate::database::time;
use crate::{Error, Result};

/// Wire representation of a job.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    #[schema(value_type = Object)]
    pub params: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    #[schema(value_type = Object)]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(default, rename = "error", skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

impl From<&Job> for JobDto {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            kind: job.kind.clone(),
            state: job.state.clone(),
            progress: job.progress,
            created_at: time::parse_rfc3339(&job.created_at),
            updated_at: time::parse_rfc3339(&job.updated_at),
            params: job.params_value(),
            result: job.result_value(),
            error_code: job.error_code.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Request body for creating a job.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: serde_json::Value,
}

/// Serialize a job and hand it to the bus under `topic`. Failures are
/// swallowed: events are best-effort.
pub fn publish_job_event(bus: &EventBus, topic: &str, job: &Job) {
    if let Ok(payload) = serde_json::to_value(JobDto::from(job)) {
        bus.publish(topic, payload);
    }
}

/// Facade over the job repository and the event bus.
pub struct JobService {
    repo: Arc<dyn JobRepository>,
    bus: Arc<EventBus>,
}

impl JobService {
    pub fn new(repo: Arc<dyn JobRepository>, bus: Arc<EventBus>) -> Self {
        Self { repo, bus }
    }

    /// Create a new queued job and publish `job.created`.
    pub async fn create(&self, req: CreateJobRequest) -> Result<JobDto> {
        let kind = req.kind.trim();
        if kind.is_empty() {
            return Err(Error::validation("missing type"));
        }

        let params_json = match req.params {
            serde_json::Value::Null => None,
            value => Some(value.to_string()),
        };

        let job = Job::new(kind, params_json);
        let created = self.repo.create(&job).await?;
        publish_job_event(&self.bus, "job.created", &created);
        Ok(JobDto::from(&created))
    }

    pub async fn get(&self, id: &str) -> Result<JobDto> {
        Ok(JobDto::from(&self.repo.get(id).await?))
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<JobDto>> {
        let jobs = self.repo.list(limit).await?;
        Ok(jobs.iter().map(JobDto::from).collect())
    }

    /// Cancel a job. Tries `queued -> canceled`, `running -> canceled`, then
    /// `muxing -> canceled`; only one can succeed. If none applies (already
    /// terminal), the current state is returned unchanged.
    pub async fn cancel(&self, id: &str) -> Result<JobDto> {
        for expected in [JobState::Queued, JobState::Running, JobState::Muxing] {
            if let Ok(updated) = self.repo.update_state(id, expected, JobState::Canceled).await {
                publish_job_event(&self.bus, "job.canceled", &updated);
                return Ok(JobDto::from(&updated));
            }
        }

        Ok(JobDto::from(&self.repo.get(id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::database::repositories::SqlxJobRepository;
    use serde_json::json;
    use tempfile::TempDir;

    async fn test_service() -> (TempDir, JobService, Arc<EventBus>) {
        let dir = TempDir::new().unwrap();
        let url = database::database_url_for_path(&dir.path().join("svc.db").to_string_lossy());
        let pool = database::init_pool(&url).await.unwrap();
        database::run_migrations(&pool).await.unwrap();
        let bus = Arc::new(EventBus::new());
        let service = JobService::new(Arc::new(SqlxJobRepository::new(pool)), bus.clone());
        (dir, service, bus)
    }

    #[tokio::test]
    async fn create_publishes_and_round_trips() {
        let (_dir, service, bus) = test_service().await;
        let mut sub = bus.subscribe();

        let created = service
            .create(CreateJobRequest {
                kind: "sleep".to_string(),
                params: json!({"durationMs": 10}),
            })
            .await
            .unwrap();
        assert_eq!(created.state, "queued");
        assert_eq!(created.params["durationMs"], 10);

        let evt = sub.recv().await.unwrap();
        assert_eq!(evt.topic, "job.created");
        assert_eq!(evt.payload["id"], created.id.as_str());

        let fetched = service.get(&created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn create_requires_a_kind() {
        let (_dir, service, _bus) = test_service().await;
        let err = service
            .create(CreateJobRequest {
                kind: "  ".to_string(),
                params: serde_json::Value::Null,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn cancel_cascades_from_queued() {
        let (_dir, service, _bus) = test_service().await;
        let created = service
            .create(CreateJobRequest {
                kind: "noop".to_string(),
                params: serde_json::Value::Null,
            })
            .await
            .unwrap();

        let canceled = service.cancel(&created.id).await.unwrap();
        assert_eq!(canceled.state, "canceled");

        // Cancelling a terminal job returns the current state unchanged.
        let again = service.cancel(&created.id).await.unwrap();
        assert_eq!(again.state, "canceled");
    }

    #[tokio::test]
    async fn list_then_get_matches() {
        let (_dir, service, _bus) = test_service().await;
        for _ in 0..3 {
            service
                .create(CreateJobRequest {
                    kind: "noop".to_string(),
                    params: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }

        let listed = service.list(10).await.unwrap();
        assert_eq!(listed.len(), 3);
        for dto in listed {
            let fetched = service.get(&dto.id).await.unwrap();
            assert_eq!(fetched.state, dto.state);
            assert_eq!(fetched.updated_at, dto.updated_at);
        }
    }
}
