//! No-op executor, used as a test pulse.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::traits::{ExecEnv, ExecResult, JobExecutor};
use crate::database::models::Job;

pub struct NoopExecutor;

#[async_trait]
impl JobExecutor for NoopExecutor {
    async fn execute(
        &self,
        _cancel: &CancellationToken,
        _job: &Job,
        env: &ExecEnv,
    ) -> ExecResult<()> {
        if env.is_canceled().await? {
            return Ok(());
        }
        env.update_progress(1.0).await?;
        Ok(())
    }
}
