//! Subscription database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time;

/// A tracked series: a canonical base URL plus progress counters and the
/// scheduler's next-check time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Canonical season/language URL on the catalogue site, unique.
    pub base_url: String,
    /// Free display label, also used in output paths.
    pub label: String,
    /// "auto" or an exact player name (e.g. "Player 1").
    pub player: String,
    /// Highest episode for which a download job has been enqueued.
    pub last_scheduled_episode: i64,
    /// Highest episode observed complete; monotonic non-decreasing.
    pub last_downloaded_episode: i64,
    /// Highest episode offered upstream at the last fetch.
    pub last_available_episode: i64,
    /// When the scheduler should reconsider this subscription (RFC 3339).
    pub next_check_at: String,
    /// RFC 3339 timestamp of the last fetch attempt, empty before the first.
    pub last_checked_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Subscription {
    /// Create a new subscription due for an immediate first check.
    pub fn new(
        base_url: impl Into<String>,
        label: impl Into<String>,
        player: impl Into<String>,
    ) -> Self {
        let now = time::now_rfc3339();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            base_url: base_url.into(),
            label: label.into(),
            player: player.into(),
            last_scheduled_episode: 0,
            last_downloaded_episode: 0,
            last_available_episode: 0,
            next_check_at: now.clone(),
            last_checked_at: String::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
