//! Subscription repository.

use async_trait::async_trait;

use crate::database::models::Subscription;
use crate::database::repositories::is_unique_violation;
use crate::database::retry::with_write_retry;
use crate::database::{DbPool, time};
use crate::{Error, Result};

/// Subscription repository trait.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new row. A duplicate canonical base URL yields `Conflict`.
    async fn create(&self, sub: &Subscription) -> Result<Subscription>;
    async fn get(&self, id: &str) -> Result<Subscription>;
    /// Most-recently-updated first; `limit <= 0` means no limit.
    async fn list(&self, limit: i64) -> Result<Vec<Subscription>>;
    async fn update(&self, sub: &Subscription) -> Result<Subscription>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Subscriptions whose `next_check_at` is at or before `now`, ascending
    /// due order.
    async fn due(&self, now: &str, limit: i64) -> Result<Vec<Subscription>>;
    /// Atomic monotonic-max write:
    /// `last_downloaded_episode = max(last_downloaded_episode, episode)`.
    async fn mark_downloaded_episode_max(&self, id: &str, episode: i64) -> Result<Subscription>;
}

/// SQLx implementation of [`SubscriptionRepository`].
pub struct SqlxSubscriptionRepository {
    pool: DbPool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn map_conflict(err: sqlx::Error, base_url: &str) -> Error {
        if is_unique_violation(&err, "subscriptions.base_url") {
            Error::conflict(format!("a subscription for '{base_url}' already exists"))
        } else {
            Error::from(err)
        }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create(&self, sub: &Subscription) -> Result<Subscription> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, base_url, label, player,
                last_scheduled_episode, last_downloaded_episode, last_available_episode,
                next_check_at, last_checked_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sub.id)
        .bind(&sub.base_url)
        .bind(&sub.label)
        .bind(&sub.player)
        .bind(sub.last_scheduled_episode)
        .bind(sub.last_downloaded_episode)
        .bind(sub.last_available_episode)
        .bind(&sub.next_check_at)
        .bind(&sub.last_checked_at)
        .bind(&sub.created_at)
        .bind(&sub.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_conflict(e, &sub.base_url))?;

        self.get(&sub.id).await
    }

    async fn get(&self, id: &str) -> Result<Subscription> {
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Subscription", id))
    }

    async fn list(&self, limit: i64) -> Result<Vec<Subscription>> {
        let subs = if limit > 0 {
            sqlx::query_as::<_, Subscription>(
                "SELECT * FROM subscriptions ORDER BY updated_at DESC, id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Subscription>(
                "SELECT * FROM subscriptions ORDER BY updated_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await?
        };
        Ok(subs)
    }

    async fn update(&self, sub: &Subscription) -> Result<Subscription> {
        let res = with_write_retry("update_subscription", || async {
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET base_url = ?, label = ?, player = ?,
                    last_scheduled_episode = ?, last_downloaded_episode = ?,
                    last_available_episode = ?,
                    next_check_at = ?, last_checked_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&sub.base_url)
            .bind(&sub.label)
            .bind(&sub.player)
            .bind(sub.last_scheduled_episode)
            .bind(sub.last_downloaded_episode)
            .bind(sub.last_available_episode)
            .bind(&sub.next_check_at)
            .bind(&sub.last_checked_at)
            .bind(time::now_rfc3339())
            .bind(&sub.id)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_conflict(e, &sub.base_url))
        })
        .await?;

        if res.rows_affected() == 0 {
            return Err(Error::not_found("Subscription", &sub.id));
        }
        self.get(&sub.id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let res = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::not_found("Subscription", id));
        }
        Ok(())
    }

    async fn due(&self, now: &str, limit: i64) -> Result<Vec<Subscription>> {
        let subs = if limit > 0 {
            sqlx::query_as::<_, Subscription>(
                "SELECT * FROM subscriptions WHERE next_check_at <= ? ORDER BY next_check_at ASC LIMIT ?",
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Subscription>(
                "SELECT * FROM subscriptions WHERE next_check_at <= ? ORDER BY next_check_at ASC",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(subs)
    }

    async fn mark_downloaded_episode_max(&self, id: &str, episode: i64) -> Result<Subscription> {
        if episode <= 0 {
            return self.get(id).await;
        }

        with_write_retry("mark_downloaded_episode_max", || async {
            let res = sqlx::query(
                r#"
                UPDATE subscriptions
                SET last_downloaded_episode = CASE
                        WHEN ? > last_downloaded_episode THEN ?
                        ELSE last_downloaded_episode
                    END,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(episode)
            .bind(episode)
            .bind(time::now_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

            if res.rows_affected() == 0 {
                return Err(Error::not_found("Subscription", id));
            }
            Ok(())
        })
        .await?;

        self.get(id).await
    }
}
