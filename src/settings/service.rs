//! Settings service: normalization plus a change hook that feeds the
//! limiter and the worker pool.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Result;
use crate::database::models::Settings;
use crate::database::repositories::SettingsRepository;

type ChangeHook = Box<dyn Fn(&Settings) + Send + Sync>;

/// Read access to the live settings, the seam workers depend on.
#[async_trait]
pub trait RuntimeSettings: Send + Sync {
    async fn current(&self) -> Result<Settings>;
}

/// Facade over the settings repository.
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    on_change: Mutex<Option<ChangeHook>>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self {
            repo,
            on_change: Mutex::new(None),
        }
    }

    /// Install the hook invoked after every successful put. The wiring uses
    /// it to push `maxConcurrentDownloads` into the limiter and
    /// `maxWorkers` into the pool.
    pub fn set_on_change(&self, hook: impl Fn(&Settings) + Send + Sync + 'static) {
        *self.on_change.lock() = Some(Box::new(hook));
    }

    pub async fn get(&self) -> Result<Settings> {
        self.repo.get().await
    }

    /// Normalize and persist the settings, then fire the change hook.
    pub async fn put(&self, settings: Settings) -> Result<Settings> {
        let stored = self.repo.put(&normalize(settings)).await?;

        if let Some(hook) = self.on_change.lock().as_ref() {
            hook(&stored);
        }
        Ok(stored)
    }
}

#[async_trait]
impl RuntimeSettings for SettingsService {
    async fn current(&self) -> Result<Settings> {
        self.get().await
    }
}

/// Replace empty or out-of-range fields with the defaults.
fn normalize(mut settings: Settings) -> Settings {
    let defaults = Settings::default();
    if settings.destination.trim().is_empty() {
        settings.destination = defaults.destination;
    }
    if settings.max_workers == 0 {
        settings.max_workers = defaults.max_workers;
    }
    if settings.max_concurrent_downloads == 0 {
        settings.max_concurrent_downloads = defaults.max_concurrent_downloads;
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::database::repositories::SqlxSettingsRepository;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    async fn test_service() -> (TempDir, SettingsService) {
        let dir = TempDir::new().unwrap();
        let url = database::database_url_for_path(&dir.path().join("set.db").to_string_lossy());
        let pool = database::init_pool(&url).await.unwrap();
        database::run_migrations(&pool).await.unwrap();
        (
            dir,
            SettingsService::new(Arc::new(SqlxSettingsRepository::new(pool))),
        )
    }

    #[tokio::test]
    async fn put_normalizes_empty_and_zero_fields() {
        let (_dir, service) = test_service().await;

        let mut settings = Settings::default();
        settings.destination = "  ".to_string();
        settings.max_workers = 0;
        settings.max_concurrent_downloads = 0;

        let stored = service.put(settings).await.unwrap();
        assert_eq!(stored.destination, "videos");
        assert_eq!(stored.max_workers, 2);
        assert_eq!(stored.max_concurrent_downloads, 4);
    }

    #[tokio::test]
    async fn put_of_get_is_identity() {
        let (_dir, service) = test_service().await;
        let current = service.get().await.unwrap();
        let stored = service.put(current.clone()).await.unwrap();
        assert_eq!(stored, current);
        assert_eq!(service.get().await.unwrap(), current);
    }

    #[tokio::test]
    async fn change_hook_fires_with_stored_values() {
        let (_dir, service) = test_service().await;

        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        service.set_on_change(move |s| {
            seen_clone.store(s.max_concurrent_downloads, Ordering::SeqCst);
        });

        let mut settings = Settings::default();
        settings.max_concurrent_downloads = 7;
        service.put(settings).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
