//! Write-path retry for a busy SQLite store.
//!
//! WAL mode lets readers proceed, but concurrent workers claiming and
//! finishing jobs can still collide on the single write lock and surface
//! SQLITE_BUSY. The hot write paths (claim, state transitions, the
//! monotonic-max episode update, settings upsert) run through
//! [`with_write_retry`], which backs off briefly instead of failing the
//! job lifecycle.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

/// Retries after the initial attempt.
const MAX_RETRIES: u32 = 8;
const BASE_DELAY: Duration = Duration::from_millis(15);
const MAX_DELAY: Duration = Duration::from_secs(1);

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), or the textual form sqlx reports
/// when the driver surfaces the lock outside a database error.
fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(source) = err else {
        return false;
    };

    match source {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("5") | Some("6"))
                || db_err.message().to_ascii_lowercase().contains("database is locked")
        }
        other => other
            .to_string()
            .to_ascii_lowercase()
            .contains("database is locked"),
    }
}

/// Exponential step capped at [`MAX_DELAY`], with quarter-range jitter.
fn backoff(retry: u32) -> Duration {
    let step = BASE_DELAY.saturating_mul(1u32 << retry.min(10));
    let capped = step.min(MAX_DELAY);
    let jitter_ms = rand::rng().random_range(0..=capped.as_millis() as u64 / 4);
    (capped + Duration::from_millis(jitter_ms)).min(MAX_DELAY)
}

/// Run `op`, backing off and retrying while the store reports the write
/// lock as held. Any other error propagates immediately.
pub async fn with_write_retry<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if retry >= MAX_RETRIES || !is_busy(&err) {
            return Err(err);
        }

        let delay = backoff(retry);
        debug!(op = op_name, retry, ?delay, "sqlite write lock held, backing off");
        sleep(delay).await;
        retry += 1;
    }
}
