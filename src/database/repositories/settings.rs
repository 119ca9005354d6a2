//! Settings repository.
//!
//! A single-row store keyed by the constant `"default"`. Missing or
//! corrupted rows fall back to the built-in defaults so the service always
//! has a usable configuration.

use async_trait::async_trait;

use crate::Result;
use crate::database::models::Settings;
use crate::database::retry::with_write_retry;
use crate::database::{DbPool, time};

const SETTINGS_KEY: &str = "default";

/// Settings repository trait.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self) -> Result<Settings>;
    async fn put(&self, settings: &Settings) -> Result<Settings>;
}

/// SQLx implementation of [`SettingsRepository`].
pub struct SqlxSettingsRepository {
    pool: DbPool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self) -> Result<Settings> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value_json FROM settings WHERE key = ?")
                .bind(SETTINGS_KEY)
                .fetch_optional(&self.pool)
                .await?;

        let Some(raw) = raw else {
            return Ok(Settings::default());
        };

        // Corrupted blob: fall back rather than wedge every reader.
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    async fn put(&self, settings: &Settings) -> Result<Settings> {
        let blob = serde_json::to_string(settings)?;
        with_write_retry("put_settings", || async {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value_json, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(SETTINGS_KEY)
            .bind(&blob)
            .bind(time::now_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;
        self.get().await
    }
}
