use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use asd_server::api::{ApiServer, ApiServerConfig, AppState};
use asd_server::bus::EventBus;
use asd_server::catalogue::HttpEpisodeSource;
use asd_server::config::RuntimeConfig;
use asd_server::database::repositories::{
    SqlxJobRepository, SqlxSettingsRepository, SqlxSubscriptionRepository,
};
use asd_server::executors::ExecutorRegistry;
use asd_server::jobs::JobService;
use asd_server::limiter::DynamicLimiter;
use asd_server::settings::{RuntimeSettings, SettingsService};
use asd_server::subscriptions::{
    DownloadCompletionUpdater, SubscriptionScheduler, SubscriptionService,
};
use asd_server::worker::{WorkerOptions, WorkerPool};
use asd_server::{Result, database};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asd_server=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = RuntimeConfig::from_env();
    tracing::info!(addr = %config.addr, db = %config.db_path, "starting");

    let pool = database::init_pool(&database::database_url_for_path(&config.db_path)).await?;
    database::run_migrations(&pool).await?;

    let bus = Arc::new(EventBus::new());

    let jobs_repo = Arc::new(SqlxJobRepository::new(pool.clone()));
    let jobs = Arc::new(JobService::new(jobs_repo.clone(), bus.clone()));

    let settings = Arc::new(SettingsService::new(Arc::new(SqlxSettingsRepository::new(
        pool.clone(),
    ))));

    let subs_repo = Arc::new(SqlxSubscriptionRepository::new(pool.clone()));
    let subscriptions = Arc::new(SubscriptionService::new(
        subs_repo.clone(),
        jobs.clone(),
        bus.clone(),
        Arc::new(HttpEpisodeSource::new()),
    ));

    let startup_settings = settings.get().await?;

    // Shared gate for all workers; the ceiling follows live settings.
    let download_limiter = Arc::new(DynamicLimiter::new(
        startup_settings.max_concurrent_downloads,
    ));

    let shutdown = CancellationToken::new();

    let runtime_settings: Arc<dyn RuntimeSettings> = settings.clone();
    let worker_pool = Arc::new(WorkerPool::new(
        shutdown.clone(),
        jobs_repo.clone(),
        jobs.clone(),
        bus.clone(),
        Arc::new(ExecutorRegistry::default_registry()),
        WorkerOptions::default(),
        Some(download_limiter.clone()),
        Some(runtime_settings),
    ));
    worker_pool.set_count(startup_settings.max_workers as usize);
    tracing::info!(workers = worker_pool.count(), "workers started");

    // Settings changes feed the limiter and the pool without a restart.
    {
        let download_limiter = download_limiter.clone();
        let worker_pool = worker_pool.clone();
        settings.set_on_change(move |updated| {
            download_limiter.set_limit(updated.max_concurrent_downloads);
            worker_pool.set_count(updated.max_workers as usize);
        });
    }

    let scheduler = SubscriptionScheduler::new(subscriptions.clone(), subs_repo.clone());
    let scheduler_cancel = shutdown.clone();
    tokio::spawn(async move { scheduler.run(scheduler_cancel).await });

    let updater = DownloadCompletionUpdater::new(bus.clone(), subs_repo.clone());
    let updater_cancel = shutdown.clone();
    tokio::spawn(async move { updater.run(updater_cancel).await });

    let state = AppState {
        jobs,
        subscriptions,
        settings,
        bus: bus.clone(),
    };
    let server = ApiServer::new(
        ApiServerConfig {
            addr: config.addr.clone(),
            enable_cors: true,
        },
        state,
    );
    let server_cancel = server.cancel_token();

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    let stop_server = shutdown.clone();
    tokio::spawn(async move {
        stop_server.cancelled().await;
        server_cancel.cancel();
    });

    server.run().await?;

    // In-flight jobs drain on their own clock.
    shutdown.cancel();
    worker_pool.close().await;
    bus.close();
    tracing::info!("bye");

    Ok(())
}
