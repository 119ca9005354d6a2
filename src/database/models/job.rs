//! Job database model and state machine.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time;

/// Job states.
///
/// `queued -> running -> muxing -> completed` is the happy path; any
/// non-terminal state may also move to `canceled` or `failed`. Terminal
/// states have no outgoing transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be picked up by a worker.
    Queued,
    /// Claimed and being executed.
    Running,
    /// Execution finished, finalization in progress.
    Muxing,
    /// Finished successfully.
    Completed,
    /// Terminated with an error.
    Failed,
    /// Canceled by a caller.
    Canceled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Muxing => "muxing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "muxing" => Some(Self::Muxing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Check whether `from -> to` is a legal transition.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        if from == to {
            return true;
        }
        match from {
            Self::Queued => matches!(to, Self::Running | Self::Canceled | Self::Failed),
            Self::Running => matches!(to, Self::Muxing | Self::Canceled | Self::Failed),
            Self::Muxing => matches!(to, Self::Completed | Self::Canceled | Self::Failed),
            Self::Completed | Self::Failed | Self::Canceled => false,
        }
    }
}

/// Job database model.
///
/// A persisted unit of work with an opaque params blob and a state machine
/// driven by the claiming worker.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Job kind, keyed into the executor registry ("download", "sleep", ...).
    #[sqlx(rename = "type")]
    pub kind: String,
    pub state: String,
    /// Progress in [0, 1], monotonic until a terminal state.
    pub progress: f64,
    /// RFC 3339 UTC timestamp.
    pub created_at: String,
    /// RFC 3339 UTC timestamp, bumped on every mutation.
    pub updated_at: String,
    /// Opaque JSON params blob.
    pub params_json: Option<String>,
    /// Opaque JSON result blob.
    pub result_json: Option<String>,
    /// Short stable error token, empty when the job has not failed.
    pub error_code: String,
    pub error_message: String,
}

impl Job {
    /// Create a new queued job with a fresh sortable id.
    pub fn new(kind: impl Into<String>, params_json: Option<String>) -> Self {
        let now = time::now_rfc3339();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind: kind.into(),
            state: JobState::Queued.as_str().to_string(),
            progress: 0.0,
            created_at: now.clone(),
            updated_at: now,
            params_json,
            result_json: None,
            error_code: String::new(),
            error_message: String::new(),
        }
    }

    /// Get the job state as an enum.
    pub fn get_state(&self) -> Option<JobState> {
        JobState::parse(&self.state)
    }

    /// Decode the params blob, treating a missing or invalid blob as null.
    pub fn params_value(&self) -> serde_json::Value {
        self.params_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    /// Decode the result blob, treating a missing or invalid blob as null.
    pub fn result_value(&self) -> serde_json::Value {
        self.result_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_queued() {
        let job = Job::new("download", Some(r#"{"url":"https://example.com/a"}"#.into()));
        assert_eq!(job.get_state(), Some(JobState::Queued));
        assert_eq!(job.progress, 0.0);
        assert!(job.result_json.is_none());
        assert!(job.error_code.is_empty());
        assert_eq!(job.params_value()["url"], "https://example.com/a");
    }

    #[test]
    fn ids_are_sortable_by_creation() {
        let a = Job::new("noop", None);
        // v7 ids order by their millisecond timestamp.
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Job::new("noop", None);
        assert!(a.id < b.id);
    }

    #[test]
    fn happy_path_transitions() {
        assert!(JobState::can_transition(JobState::Queued, JobState::Running));
        assert!(JobState::can_transition(JobState::Running, JobState::Muxing));
        assert!(JobState::can_transition(
            JobState::Muxing,
            JobState::Completed
        ));
    }

    #[test]
    fn non_terminal_states_can_cancel_or_fail() {
        for from in [JobState::Queued, JobState::Running, JobState::Muxing] {
            assert!(JobState::can_transition(from, JobState::Canceled));
            assert!(JobState::can_transition(from, JobState::Failed));
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [JobState::Completed, JobState::Failed, JobState::Canceled] {
            for to in [
                JobState::Queued,
                JobState::Running,
                JobState::Muxing,
                JobState::Completed,
                JobState::Failed,
                JobState::Canceled,
            ] {
                if from == to {
                    continue;
                }
                assert!(!JobState::can_transition(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn skipping_states_is_illegal() {
        assert!(!JobState::can_transition(
            JobState::Queued,
            JobState::Completed
        ));
        assert!(!JobState::can_transition(
            JobState::Running,
            JobState::Completed
        ));
        assert!(!JobState::can_transition(JobState::Queued, JobState::Muxing));
    }
}
