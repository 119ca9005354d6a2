//! Fallback executor for unknown job kinds: drives a fixed-step progress
//! curve.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::traits::{ErrorCode, ExecEnv, ExecError, ExecResult, JobExecutor};
use crate::database::models::Job;

const DEFAULT_STEPS: u32 = 10;
const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(400);

pub struct DefaultExecutor;

#[async_trait]
impl JobExecutor for DefaultExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        _job: &Job,
        env: &ExecEnv,
    ) -> ExecResult<()> {
        let steps = if env.steps == 0 { DEFAULT_STEPS } else { env.steps };
        let step = if env.step_interval.is_zero() {
            DEFAULT_STEP_INTERVAL
        } else {
            env.step_interval
        };

        for i in 1..=steps {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ExecError::new(ErrorCode::ExecutorError, "context canceled"));
                }
                _ = tokio::time::sleep(step) => {}
            }

            if env.is_canceled().await? {
                return Ok(());
            }

            let progress = (f64::from(i) / f64::from(steps)).clamp(0.0, 1.0);
            env.update_progress(progress).await?;
        }

        Ok(())
    }
}
