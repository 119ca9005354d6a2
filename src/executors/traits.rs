//! Executor contract: the per-kind strategy a worker invokes for exactly
//! one job, and the capability environment it runs against.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::database::models::{Job, JobState};
use crate::database::repositories::JobRepository;
use crate::jobs::{CreateJobRequest, JobService, publish_job_event};
use crate::{Error, Result};

/// Stable error tokens persisted in `jobs.error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParams,
    HttpStatus,
    NetworkError,
    IoError,
    ExecutorError,
    Timeout,
    ChildFailed,
    NotFound,
    WorkerCanceled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::HttpStatus => "http_status",
            Self::NetworkError => "network_error",
            Self::IoError => "io_error",
            Self::ExecutorError => "executor_error",
            Self::Timeout => "timeout",
            Self::ChildFailed => "child_failed",
            Self::NotFound => "not_found",
            Self::WorkerCanceled => "worker_canceled",
        }
    }
}

/// An executor failure with a stable code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecError {
    pub code: ErrorCode,
    pub message: String,
}

impl ExecError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }
}

impl From<Error> for ExecError {
    fn from(err: Error) -> Self {
        Self::new(ErrorCode::ExecutorError, err.to_string())
    }
}

pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Capability environment handed to an executor.
///
/// Executors depend on these capabilities, never on concrete services; the
/// worker assembles one per execution.
pub struct ExecEnv {
    repo: Arc<dyn JobRepository>,
    jobs: Arc<JobService>,
    bus: Arc<EventBus>,
    job_id: String,
    /// Tick length for progress-driving executors.
    pub step_interval: Duration,
    /// Tick count for the fixed-curve fallback executor.
    pub steps: u32,
    /// Effective output root for downloads.
    pub destination: String,
}

impl ExecEnv {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        jobs: Arc<JobService>,
        bus: Arc<EventBus>,
        job_id: impl Into<String>,
        step_interval: Duration,
        steps: u32,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            jobs,
            bus,
            job_id: job_id.into(),
            step_interval,
            steps,
            destination: destination.into(),
        }
    }

    /// Persist a progress value and publish `job.progress`.
    pub async fn update_progress(&self, progress: f64) -> Result<()> {
        let updated = self.repo.update_progress(&self.job_id, progress).await?;
        publish_job_event(&self.bus, "job.progress", &updated);
        Ok(())
    }

    /// Persist the opaque result blob.
    pub async fn update_result(&self, result: &serde_json::Value) -> Result<()> {
        self.repo
            .update_result(&self.job_id, &result.to_string())
            .await?;
        Ok(())
    }

    /// Cheap poll: has the job been transitioned to `canceled`?
    ///
    /// Re-reads the row on every call; cheap compared to execution cost.
    pub async fn is_canceled(&self) -> Result<bool> {
        let current = self.repo.get(&self.job_id).await?;
        Ok(current.get_state() == Some(JobState::Canceled))
    }

    /// Create a child job (for orchestrating executors).
    pub async fn create_job(&self, kind: &str, params: serde_json::Value) -> Result<String> {
        let dto = self
            .jobs
            .create(CreateJobRequest {
                kind: kind.to_string(),
                params,
            })
            .await?;
        Ok(dto.id)
    }

    /// Fetch a job row by id (for orchestrating executors).
    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.repo.get(id).await
    }
}

/// A strategy invoked by a worker for exactly one job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, cancel: &CancellationToken, job: &Job, env: &ExecEnv)
    -> ExecResult<()>;
}
