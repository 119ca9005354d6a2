//! Download concurrency is a global property of the shared limiter, not
//! per-worker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::response::Response;
use axum::routing::get;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use asd_server::bus::EventBus;
use asd_server::database::models::{JobState, Settings};
use asd_server::database::repositories::{
    JobRepository, SqlxJobRepository, SqlxSettingsRepository,
};
use asd_server::database::{self};
use asd_server::executors::ExecutorRegistry;
use asd_server::jobs::{CreateJobRequest, JobService};
use asd_server::limiter::DynamicLimiter;
use asd_server::settings::{RuntimeSettings, SettingsService};
use asd_server::worker::{WorkerOptions, WorkerPool};

async fn slow() -> Response {
    let stream = futures::stream::unfold(0u32, |chunk| async move {
        if chunk >= 10 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        Some((Ok::<_, std::io::Error>(vec![0u8; 512]), chunk + 1))
    });
    Response::new(Body::from_stream(stream))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_workers_share_one_download_slot() {
    let app = Router::new().route("/slow", get(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let dir = TempDir::new().unwrap();
    let url = database::database_url_for_path(&dir.path().join("gate.db").to_string_lossy());
    let pool = database::init_pool(&url).await.unwrap();
    database::run_migrations(&pool).await.unwrap();

    let bus = Arc::new(EventBus::new());
    let repo = Arc::new(SqlxJobRepository::new(pool.clone()));
    let jobs = Arc::new(JobService::new(repo.clone(), bus.clone()));

    let settings = Arc::new(SettingsService::new(Arc::new(SqlxSettingsRepository::new(
        pool.clone(),
    ))));
    settings
        .put(Settings {
            destination: dir.path().join("videos").to_string_lossy().into_owned(),
            max_concurrent_downloads: 1,
            max_workers: 2,
            ..Settings::default()
        })
        .await
        .unwrap();

    let limiter = Arc::new(DynamicLimiter::new(1));
    let shutdown = CancellationToken::new();
    let runtime_settings: Arc<dyn RuntimeSettings> = settings;
    let workers = Arc::new(WorkerPool::new(
        shutdown.clone(),
        repo.clone(),
        jobs.clone(),
        bus,
        Arc::new(ExecutorRegistry::default_registry()),
        WorkerOptions {
            poll_interval: Duration::from_millis(20),
            ..WorkerOptions::default()
        },
        Some(limiter.clone()),
        Some(runtime_settings),
    ));
    workers.set_count(2);

    let mut ids = Vec::new();
    for i in 0..2 {
        let created = jobs
            .create(CreateJobRequest {
                kind: "download".to_string(),
                params: serde_json::json!({
                    "url": format!("http://{addr}/slow"),
                    "path": format!("out/slow-{i}.bin"),
                }),
            })
            .await
            .unwrap();
        ids.push(created.id);
    }

    // Both workers are live, but the gate admits one transfer at a time.
    let mut max_in_flight = 0;
    for _ in 0..150 {
        max_in_flight = max_in_flight.max(limiter.in_flight());
        let mut done = 0;
        for id in &ids {
            let job = repo.get(id).await.unwrap();
            if job.get_state() == Some(JobState::Completed) {
                done += 1;
            }
        }
        if done == ids.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(max_in_flight, 1, "the shared ceiling must gate both workers");
    for id in &ids {
        let job = repo.get(id).await.unwrap();
        assert_eq!(job.get_state(), Some(JobState::Completed));
    }

    shutdown.cancel();
    workers.close().await;
}
