//! Sleep executor: ticks progress until a deadline, respecting
//! cancellation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::traits::{ErrorCode, ExecEnv, ExecError, ExecResult, JobExecutor};
use crate::database::models::Job;

const DEFAULT_STEP: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SleepParams {
    /// Suffixed duration string, e.g. "500ms", "2s", "1m".
    duration: String,
    duration_ms: u64,
    seconds: u64,
}

/// Parse a suffixed duration string ("250ms", "2s", "3m", "1h").
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit())?);
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

pub struct SleepExecutor;

#[async_trait]
impl JobExecutor for SleepExecutor {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        job: &Job,
        env: &ExecEnv,
    ) -> ExecResult<()> {
        let params: SleepParams = serde_json::from_value(job.params_value()).unwrap_or_default();

        let mut duration = Duration::from_secs(1);
        if let Some(parsed) = parse_duration(&params.duration) {
            duration = parsed;
        } else if params.duration_ms > 0 {
            duration = Duration::from_millis(params.duration_ms);
        } else if params.seconds > 0 {
            duration = Duration::from_secs(params.seconds);
        }

        if duration.is_zero() {
            env.update_progress(1.0).await?;
            return Ok(());
        }

        let step = if env.step_interval.is_zero() {
            DEFAULT_STEP
        } else {
            env.step_interval
        };

        let start = Instant::now();
        let mut ticker = tokio::time::interval(step);
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

            let progress =
                (start.elapsed().as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
            env.update_progress(progress).await?;
            if progress >= 1.0 {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_durations() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("3m"), Some(Duration::from_secs(180)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("10d"), None);
    }

    #[test]
    fn params_accept_all_three_shapes() {
        let p: SleepParams = serde_json::from_str(r#"{"duration":"2s"}"#).unwrap();
        assert_eq!(p.duration, "2s");
        let p: SleepParams = serde_json::from_str(r#"{"durationMs":100}"#).unwrap();
        assert_eq!(p.duration_ms, 100);
        let p: SleepParams = serde_json::from_str(r#"{"seconds":3}"#).unwrap();
        assert_eq!(p.seconds, 3);
    }
}
