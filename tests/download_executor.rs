//! Download executor integration tests against a local HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use asd_server::bus::EventBus;
use asd_server::database::models::{JobState, Settings};
use asd_server::database::repositories::{
    JobRepository, SqlxJobRepository, SqlxSettingsRepository,
};
use asd_server::database::{self, DbPool};
use asd_server::executors::ExecutorRegistry;
use asd_server::jobs::{CreateJobRequest, JobService};
use asd_server::settings::{RuntimeSettings, SettingsService};
use asd_server::worker::{WorkerOptions, WorkerPool};

const BODY: &str = "hello world";

async fn hello() -> Response {
    let mut resp = (StatusCode::OK, BODY).into_response();
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    resp
}

async fn slow() -> Response {
    let stream = futures::stream::unfold(0u32, |chunk| async move {
        if chunk >= 20 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        Some((Ok::<_, std::io::Error>(vec![0u8; 1024]), chunk + 1))
    });
    let mut resp = Response::new(Body::from_stream(stream));
    resp.headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from_static("20480"));
    resp
}

/// Spawn a throwaway HTTP server and return its base URL.
async fn spawn_test_server() -> String {
    let app = Router::new()
        .route("/hello", get(hello))
        .route("/slow", get(slow));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct Fixture {
    _dir: TempDir,
    _pool: DbPool,
    out_dir: std::path::PathBuf,
    repo: Arc<SqlxJobRepository>,
    jobs: Arc<JobService>,
    workers: Arc<WorkerPool>,
    shutdown: CancellationToken,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let url = database::database_url_for_path(&dir.path().join("dl.db").to_string_lossy());
    let pool = database::init_pool(&url).await.unwrap();
    database::run_migrations(&pool).await.unwrap();

    let out_dir = dir.path().join("videos");

    let bus = Arc::new(EventBus::new());
    let repo = Arc::new(SqlxJobRepository::new(pool.clone()));
    let jobs = Arc::new(JobService::new(repo.clone(), bus.clone()));

    let settings = Arc::new(SettingsService::new(Arc::new(SqlxSettingsRepository::new(
        pool.clone(),
    ))));
    let stored = Settings {
        destination: out_dir.to_string_lossy().into_owned(),
        ..Settings::default()
    };
    settings.put(stored).await.unwrap();

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
        None,
        Some(runtime_settings),
    ));
    workers.set_count(1);

    Fixture {
        _dir: dir,
        _pool: pool,
        out_dir,
        repo,
        jobs,
        workers,
        shutdown,
    }
}

async fn wait_for_terminal(repo: &SqlxJobRepository, id: &str) -> JobState {
    for _ in 0..500 {
        let job = repo.get(id).await.unwrap();
        if let Some(state) = job.get_state()
            && state.is_terminal()
        {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn happy_path_streams_renames_and_records_result() {
    let base = spawn_test_server().await;
    let fx = fixture().await;

    let created = fx
        .jobs
        .create(CreateJobRequest {
            kind: "download".to_string(),
            params: serde_json::json!({
                "url": format!("{base}/hello"),
                "path": "out/hello.bin",
            }),
        })
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&fx.repo, &created.id).await, JobState::Completed);

    let finished = fx.repo.get(&created.id).await.unwrap();
    assert_eq!(finished.progress, 1.0);

    let result = finished.result_value();
    assert_eq!(result["url"], format!("{base}/hello"));
    assert_eq!(result["bytes"], BODY.len() as u64);
    assert_eq!(result["contentType"], "application/octet-stream");

    let dst = fx.out_dir.join("out/hello.bin");
    assert_eq!(result["path"], dst.to_string_lossy().as_ref());
    assert_eq!(std::fs::read_to_string(&dst).unwrap(), BODY);
    assert!(!dst.with_extension("bin.part").exists());

    fx.shutdown.cancel();
    fx.workers.close().await;
}

#[tokio::test]
async fn http_404_fails_with_http_status() {
    let base = spawn_test_server().await;
    let fx = fixture().await;

    let created = fx
        .jobs
        .create(CreateJobRequest {
            kind: "download".to_string(),
            params: serde_json::json!({"url": format!("{base}/missing")}),
        })
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&fx.repo, &created.id).await, JobState::Failed);
    let failed = fx.repo.get(&created.id).await.unwrap();
    assert_eq!(failed.error_code, "http_status");

    fx.shutdown.cancel();
    fx.workers.close().await;
}

#[tokio::test]
async fn unreachable_host_fails_with_network_error() {
    let fx = fixture().await;

    let created = fx
        .jobs
        .create(CreateJobRequest {
            kind: "download".to_string(),
            // A port from the discard range with nothing listening.
            params: serde_json::json!({"url": "http://127.0.0.1:9/never"}),
        })
        .await
        .unwrap();

    assert_eq!(wait_for_terminal(&fx.repo, &created.id).await, JobState::Failed);
    let failed = fx.repo.get(&created.id).await.unwrap();
    assert_eq!(failed.error_code, "network_error");

    fx.shutdown.cancel();
    fx.workers.close().await;
}

#[tokio::test]
async fn traversal_and_bad_scheme_are_invalid_params() {
    let fx = fixture().await;

    for params in [
        serde_json::json!({"url": "https://example.com", "path": "../escape"}),
        serde_json::json!({"url": "ftp://example.com/file"}),
        serde_json::json!({"url": ""}),
    ] {
        let created = fx
            .jobs
            .create(CreateJobRequest {
                kind: "download".to_string(),
                params,
            })
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&fx.repo, &created.id).await, JobState::Failed);
        let failed = fx.repo.get(&created.id).await.unwrap();
        assert_eq!(failed.error_code, "invalid_params");
    }

    fx.shutdown.cancel();
    fx.workers.close().await;
}

#[tokio::test]
async fn cancellation_mid_stream_removes_the_partial_file() {
    let base = spawn_test_server().await;
    let fx = fixture().await;

    let created = fx
        .jobs
        .create(CreateJobRequest {
            kind: "download".to_string(),
            params: serde_json::json!({
                "url": format!("{base}/slow"),
                "path": "out/slow.bin",
            }),
        })
        .await
        .unwrap();

    // Let the transfer start, then cancel.
    for _ in 0..100 {
        let job = fx.repo.get(&created.id).await.unwrap();
        if job.get_state() == Some(JobState::Running) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    fx.jobs.cancel(&created.id).await.unwrap();

    // Cancellation is observed between reads; give it a moment.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let current = fx.repo.get(&created.id).await.unwrap();
    assert_eq!(current.get_state(), Some(JobState::Canceled));

    let dst = fx.out_dir.join("out/slow.bin");
    assert!(!dst.exists());
    assert!(!fx.out_dir.join("out/slow.bin.part").exists());

    fx.shutdown.cancel();
    fx.workers.close().await;
}
