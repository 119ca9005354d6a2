//! Wait executor: polls a set of child jobs until they all reach a terminal
//! state, with optional fail-fast and timeout.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::traits::{ErrorCode, ExecEnv, ExecError, ExecResult, JobExecutor};
use crate::database::models::{Job, JobState};
use crate::database::time;

const DEFAULT_POLL: Duration = Duration::from_millis(300);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WaitParams {
    job_ids: Vec<String>,
    fail_on_failed: Option<bool>,
    timeout_ms: u64,
    poll_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaitChildSummary {
    id: String,
    state: String,
    progress: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    error_code: String,
    #[serde(rename = "error", skip_serializing_if = "String::is_empty")]
    error_message: String,
}

pub struct WaitExecutor;

#[async_trait]
impl JobExecutor for WaitExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        job: &Job,
        env: &ExecEnv,
    ) -> ExecResult<()> {
        let params: WaitParams = serde_json::from_value(job.params_value()).unwrap_or_default();
        if params.job_ids.is_empty() {
            return Err(ExecError::invalid_params("missing params.jobIds"));
        }

        let mut ids: Vec<String> = Vec::with_capacity(params.job_ids.len());
        for raw in &params.job_ids {
            let id = raw.trim();
            if id.is_empty() {
                return Err(ExecError::invalid_params("jobIds must be non-empty"));
            }
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }

        let fail_on_failed = params.fail_on_failed.unwrap_or(true);
        let poll = if params.poll_ms > 0 {
            Duration::from_millis(params.poll_ms)
        } else {
            DEFAULT_POLL
        };
        let deadline = (params.timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(params.timeout_ms));

        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick completes immediately

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ExecError::new(ErrorCode::ExecutorError, "context canceled"));
                }
                _ = ticker.tick() => {}
            }

            if env.is_canceled().await? {
                return Ok(());
            }

            if let Some(deadline) = deadline
                && Instant::now() > deadline
            {
                return Err(ExecError::new(ErrorCode::Timeout, "wait timeout"));
            }

            let mut summaries = Vec::with_capacity(ids.len());
            let mut done = 0usize;
            for id in &ids {
                let child = match env.get_job(id).await {
                    Ok(child) => child,
                    Err(err) if err.is_not_found() => {
                        return Err(ExecError::new(
                            ErrorCode::NotFound,
                            format!("child job not found: {id}"),
                        ));
                    }
                    Err(err) => return Err(err.into()),
                };

                let state = child.get_state();
                summaries.push(WaitChildSummary {
                    id: child.id.clone(),
                    state: child.state.clone(),
                    progress: child.progress,
                    error_code: child.error_code.clone(),
                    error_message: child.error_message.clone(),
                });

                if let Some(state) = state
                    && state.is_terminal()
                {
                    done += 1;
                    if fail_on_failed
                        && matches!(state, JobState::Failed | JobState::Canceled)
                    {
                        return Err(ExecError::new(
                            ErrorCode::ChildFailed,
                            format!("child job failed: {}", child.id),
                        ));
                    }
                }
            }

            // Cap below 1 until every child is terminal.
            let progress = (done as f64 / ids.len() as f64).clamp(0.0, 0.999);
            env.update_progress(progress).await?;

            if done == ids.len() {
                env.update_result(&json!({
                    "jobIds": ids,
                    "total": ids.len(),
                    "done": done,
                    "children": summaries,
                    "completedAt": time::now_rfc3339(),
                }))
                .await?;
                env.update_progress(1.0).await?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_shape() {
        let p: WaitParams = serde_json::from_str(r#"{"jobIds":["a","b","a"]}"#).unwrap();
        assert_eq!(p.job_ids.len(), 3);
        assert!(p.fail_on_failed.is_none());
        assert_eq!(p.timeout_ms, 0);
        assert_eq!(p.poll_ms, 0);
    }

    #[test]
    fn fail_on_failed_can_be_disabled() {
        let p: WaitParams =
            serde_json::from_str(r#"{"jobIds":["a"],"failOnFailed":false}"#).unwrap();
        assert_eq!(p.fail_on_failed, Some(false));
    }
}
