//! Spawn executor: creates a batch of child jobs and records their ids.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::traits::{ExecEnv, ExecError, ExecResult, JobExecutor};
use crate::database::models::Job;

#[derive(Debug, Deserialize)]
struct SpawnJobSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SpawnParams {
    jobs: Vec<SpawnJobSpec>,
}

pub struct SpawnExecutor;

#[async_trait]
impl JobExecutor for SpawnExecutor {
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        job: &Job,
        env: &ExecEnv,
    ) -> ExecResult<()> {
        let params: SpawnParams = serde_json::from_value(job.params_value()).unwrap_or_default();
        if params.jobs.is_empty() {
            return Err(ExecError::invalid_params("missing params.jobs"));
        }

        let mut ids = Vec::with_capacity(params.jobs.len());
        for spec in &params.jobs {
            if spec.kind.trim().is_empty() {
                return Err(ExecError::invalid_params("spawn job missing type"));
            }

            // Stop cleanly without creating further children.
            if env.is_canceled().await? {
                return Ok(());
            }

            let id = env.create_job(spec.kind.trim(), spec.params.clone()).await?;
            ids.push(id);
        }

        env.update_result(&json!({ "jobIds": ids })).await?;
        env.update_progress(1.0).await?;
        Ok(())
    }
}
