//! Database module.
//!
//! Persistence layer backed by SQLite through sqlx: connection pool
//! management, versioned migrations, row models, and repositories.

pub mod migrations;
pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

pub use migrations::run_migrations;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Initialize the SQLite connection pool.
///
/// WAL journal mode allows readers to proceed while a worker is writing;
/// writes are serialized through a small pool so the conditional updates in
/// the repositories stay cheap under contention.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    init_pool_with_size(database_url, 4).await
}

/// Initialize the SQLite connection pool with an explicit size.
pub async fn init_pool_with_size(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    tracing::info!(
        "Database pool initialized with WAL mode, {} max connections",
        max_connections
    );

    Ok(pool)
}

/// Build a `sqlite:` URL for a filesystem path.
pub fn database_url_for_path(path: &str) -> String {
    format!("sqlite:{}?mode=rwc", path.replace('\\', "/"))
}
