//! Worker: the single-consumer claim/execute loop.

pub mod pool;

pub use pool::WorkerPool;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::database::models::{Job, JobState, Settings};
use crate::database::repositories::JobRepository;
use crate::executors::{ExecEnv, ExecutorRegistry};
use crate::jobs::{JobService, publish_job_event};
use crate::limiter::DynamicLimiter;
use crate::settings::RuntimeSettings;

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Queue poll tick.
    pub poll_interval: Duration,
    /// Progress tick for step-driven executors.
    pub step_interval: Duration,
    /// Step count for the fixed-curve fallback executor.
    pub steps: u32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(750),
            step_interval: Duration::from_millis(400),
            steps: 10,
        }
    }
}

/// A single sequential consumer of the job queue.
pub struct Worker {
    id: usize,
    repo: Arc<dyn JobRepository>,
    jobs: Arc<JobService>,
    bus: Arc<EventBus>,
    registry: Arc<ExecutorRegistry>,
    opts: WorkerOptions,
    download_limiter: Option<Arc<DynamicLimiter>>,
    settings: Option<Arc<dyn RuntimeSettings>>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        repo: Arc<dyn JobRepository>,
        jobs: Arc<JobService>,
        bus: Arc<EventBus>,
        registry: Arc<ExecutorRegistry>,
        opts: WorkerOptions,
        download_limiter: Option<Arc<DynamicLimiter>>,
        settings: Option<Arc<dyn RuntimeSettings>>,
    ) -> Self {
        Self {
            id,
            repo,
            jobs,
            bus,
            registry,
            opts,
            download_limiter,
            settings,
        }
    }

    /// Run until `cancel` fires. The worker never self-terminates on
    /// executor or repository errors; it logs and returns to polling.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.opts.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(worker = self.id, "worker stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.repo.claim_next_queued().await {
                Ok(Some(job)) => self.execute(&cancel, job).await,
                Ok(None) => {}
                Err(err) => {
                    warn!(worker = self.id, error = %err, "claim next job failed");
                }
            }
        }
    }

    async fn execute(&self, cancel: &CancellationToken, job: Job) {
        info!(worker = self.id, job_id = %job.id, kind = %job.kind, "job claimed");
        publish_job_event(&self.bus, "job.started", &job);

        let settings = self.current_settings().await;

        // Downloads go through the shared gate; its ceiling follows the
        // live settings value.
        let _permit = if job.kind == "download"
            && let Some(limiter) = &self.download_limiter
        {
            limiter.set_limit(settings.max_concurrent_downloads);
            match limiter.acquire(cancel).await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.fail_job(
                        &job,
                        "worker_canceled",
                        "worker canceled while waiting for a download slot",
                    )
                    .await;
                    return;
                }
            }
        } else {
            None
        };

        let env = ExecEnv::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.jobs),
            Arc::clone(&self.bus),
            job.id.clone(),
            self.opts.step_interval,
            self.opts.steps,
            settings.destination.clone(),
        );

        let executor = self.registry.get(&job.kind);
        if let Err(exec_err) = executor.execute(cancel, &job, &env).await {
            warn!(
                worker = self.id,
                job_id = %job.id,
                code = exec_err.code.as_str(),
                error = %exec_err,
                "executor failed"
            );
            self.fail_job(&job, exec_err.code.as_str(), &exec_err.message)
                .await;
            return;
        }

        // The executor may have returned cleanly because the job was
        // canceled mid-flight; no further transitions in that case.
        match self.repo.get(&job.id).await {
            Ok(current) if current.get_state() == Some(JobState::Canceled) => {
                info!(worker = self.id, job_id = %job.id, "job canceled");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(worker = self.id, job_id = %job.id, error = %err, "failed to reload job");
                return;
            }
        }

        let muxing = match self
            .repo
            .update_state(&job.id, JobState::Running, JobState::Muxing)
            .await
        {
            Ok(job) => job,
            Err(err) => {
                warn!(worker = self.id, job_id = %job.id, error = %err, "failed to mark job muxing");
                return;
            }
        };
        publish_job_event(&self.bus, "job.muxing", &muxing);

        if let Err(err) = self
            .repo
            .update_state(&job.id, JobState::Muxing, JobState::Completed)
            .await
        {
            warn!(worker = self.id, job_id = %job.id, error = %err, "failed to mark job completed");
            return;
        }
        match self.repo.update_progress(&job.id, 1.0).await {
            Ok(finished) => publish_job_event(&self.bus, "job.completed", &finished),
            Err(err) => {
                warn!(worker = self.id, job_id = %job.id, error = %err, "failed to finalize progress");
            }
        }
    }

    /// Persist error fields, transition `running -> failed`, and publish
    /// `job.failed`. A lost race (e.g. concurrent cancel) is logged only.
    async fn fail_job(&self, job: &Job, code: &str, message: &str) {
        if let Err(err) = self.repo.update_error(&job.id, code, message).await {
            warn!(worker = self.id, job_id = %job.id, error = %err, "failed to persist job error");
        }
        match self
            .repo
            .update_state(&job.id, JobState::Running, JobState::Failed)
            .await
        {
            Ok(failed) => publish_job_event(&self.bus, "job.failed", &failed),
            Err(err) => {
                warn!(worker = self.id, job_id = %job.id, error = %err, "failed to mark job failed");
            }
        }
    }

    async fn current_settings(&self) -> Settings {
        match &self.settings {
            Some(source) => match source.current().await {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(worker = self.id, error = %err, "failed to load settings, using defaults");
                    Settings::default()
                }
            },
            None => Settings::default(),
        }
    }
}
