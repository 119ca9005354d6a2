//! Repositories over the SQLite store.
//!
//! Every state write is conditional at the storage layer, so the engine
//! needs no extra locks or in-memory queues to stay correct under multiple
//! workers.

pub mod job;
pub mod settings;
pub mod subscription;

pub use job::{JobRepository, SqlxJobRepository};
pub use settings::{SettingsRepository, SqlxSettingsRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};

/// Check whether a sqlx error is a UNIQUE-constraint violation on the given
/// column (e.g. `subscriptions.base_url`).
pub(crate) fn is_unique_violation(err: &sqlx::Error, column: &str) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    let msg = db_err.message().to_ascii_lowercase();
    msg.contains("unique constraint failed") && msg.contains(&column.to_ascii_lowercase())
}
