//! Job repository.

use async_trait::async_trait;

use crate::database::models::{Job, JobState};
use crate::database::retry::with_write_retry;
use crate::database::{DbPool, time};
use crate::{Error, Result};

/// Job repository trait.
///
/// Every state write is conditional on the expected current state; a
/// mismatch yields a not-found result the caller can distinguish from other
/// failures.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job row. Fails if the identifier collides.
    async fn create(&self, job: &Job) -> Result<Job>;
    async fn get(&self, id: &str) -> Result<Job>;
    /// Most-recently-updated first. Limit is clamped to [1, 500], default 100.
    async fn list(&self, limit: i64) -> Result<Vec<Job>>;
    /// Atomically claim the oldest `queued` job: transition it to `running`
    /// and return it. Returns `None` when no queued job exists. At most one
    /// caller ever observes the same job as its claim.
    async fn claim_next_queued(&self) -> Result<Option<Job>>;
    async fn update_progress(&self, id: &str, progress: f64) -> Result<Job>;
    async fn update_result(&self, id: &str, result_json: &str) -> Result<Job>;
    /// Write the error fields. Does not change state.
    async fn update_error(&self, id: &str, code: &str, message: &str) -> Result<Job>;
    /// Conditional compare-and-set state transition. Rejects pairs the state
    /// machine disallows; a row/state mismatch yields `NotFound`.
    async fn update_state(&self, id: &str, expected: JobState, next: JobState) -> Result<Job>;
}

/// SQLx implementation of [`JobRepository`].
pub struct SqlxJobRepository {
    pool: DbPool,
}

impl SqlxJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn create(&self, job: &Job) -> Result<Job> {
        with_write_retry("create_job", || async {
            sqlx::query(
                r#"
                INSERT INTO jobs (id, type, state, progress, created_at, updated_at,
                                  params_json, result_json, error_code, error_message)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&job.id)
            .bind(&job.kind)
            .bind(&job.state)
            .bind(job.progress)
            .bind(&job.created_at)
            .bind(&job.updated_at)
            .bind(&job.params_json)
            .bind(&job.result_json)
            .bind(&job.error_code)
            .bind(&job.error_message)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;
        self.get(&job.id).await
    }

    async fn get(&self, id: &str) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list(&self, limit: i64) -> Result<Vec<Job>> {
        let limit = if (1..=500).contains(&limit) { limit } else { 100 };
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs ORDER BY updated_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn claim_next_queued(&self) -> Result<Option<Job>> {
        with_write_retry("claim_next_queued", || async {
            // First select the next candidate without taking a write lock,
            // then claim it with a conditional UPDATE. Another claimer may
            // win the race, so retry a few times before reporting empty.
            for _ in 0..3 {
                let next_id: Option<String> = sqlx::query_scalar(
                    r#"
                    SELECT id FROM jobs
                    WHERE state = 'queued'
                    ORDER BY created_at ASC, id ASC
                    LIMIT 1
                    "#,
                )
                .fetch_optional(&self.pool)
                .await?;

                let Some(next_id) = next_id else {
                    return Ok(None);
                };

                let claimed = sqlx::query_as::<_, Job>(
                    r#"
                    UPDATE jobs
                    SET state = 'running', updated_at = ?
                    WHERE id = ? AND state = 'queued'
                    RETURNING *
                    "#,
                )
                .bind(time::now_rfc3339())
                .bind(&next_id)
                .fetch_optional(&self.pool)
                .await?;

                if claimed.is_some() {
                    return Ok(claimed);
                }
            }

            Ok(None)
        })
        .await
    }

    async fn update_progress(&self, id: &str, progress: f64) -> Result<Job> {
        with_write_retry("update_job_progress", || async {
            sqlx::query_as::<_, Job>(
                "UPDATE jobs SET progress = ?, updated_at = ? WHERE id = ? RETURNING *",
            )
            .bind(progress)
            .bind(time::now_rfc3339())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
        })
        .await
    }

    async fn update_result(&self, id: &str, result_json: &str) -> Result<Job> {
        with_write_retry("update_job_result", || async {
            sqlx::query_as::<_, Job>(
                "UPDATE jobs SET result_json = ?, updated_at = ? WHERE id = ? RETURNING *",
            )
            .bind(result_json)
            .bind(time::now_rfc3339())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
        })
        .await
    }

    async fn update_error(&self, id: &str, code: &str, message: &str) -> Result<Job> {
        with_write_retry("update_job_error", || async {
            sqlx::query_as::<_, Job>(
                "UPDATE jobs SET error_code = ?, error_message = ?, updated_at = ? WHERE id = ? RETURNING *",
            )
            .bind(code)
            .bind(message)
            .bind(time::now_rfc3339())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
        })
        .await
    }

    async fn update_state(&self, id: &str, expected: JobState, next: JobState) -> Result<Job> {
        if !JobState::can_transition(expected, next) {
            return Err(Error::InvalidStateTransition {
                from: expected.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        with_write_retry("update_job_state", || async {
            sqlx::query_as::<_, Job>(
                "UPDATE jobs SET state = ?, updated_at = ? WHERE id = ? AND state = ? RETURNING *",
            )
            .bind(next.as_str())
            .bind(time::now_rfc3339())
            .bind(id)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
        })
        .await
    }
}
