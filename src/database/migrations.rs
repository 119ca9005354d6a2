//! Versioned schema migration runner.
//!
//! Migration files live in `migrations/` and are embedded at compile time.
//! Each file holds an `Up` and a `Down` section delimited by
//! `-- +migrate Up` / `-- +migrate Down` marker lines; only the `Up` section
//! is applied, in ascending version order, each inside its own transaction
//! together with the `schema_migrations` version insert.

use sqlx::Row;

use super::{DbPool, time};
use crate::Result;

/// Embedded migration files, ascending version order.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "0001_init.sql", include_str!("../../migrations/0001_init.sql")),
    (
        2,
        "0002_subscriptions.sql",
        include_str!("../../migrations/0002_subscriptions.sql"),
    ),
];

/// Apply all pending migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
    )
    .execute(pool)
    .await?;

    let applied: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| row.get::<i64, _>(0))
        .collect();

    for (version, name, text) in MIGRATIONS {
        if applied.contains(version) {
            continue;
        }

        let up = extract_up(text);
        if up.trim().is_empty() {
            continue;
        }

        let mut tx = pool.begin().await?;
        // sqlx prepares one statement at a time; migrations hold several.
        for statement in split_statements(&up) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations(version, applied_at) VALUES(?, ?)")
            .bind(version)
            .bind(time::now_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(version, name, "applied migration");
    }

    Ok(())
}

/// Extract the `Up` section from a marker-delimited migration file.
fn extract_up(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_up = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("-- +migrate Up") {
            in_up = true;
            continue;
        }
        if trimmed.starts_with("-- +migrate Down") {
            in_up = false;
            continue;
        }
        if in_up {
            out.push(line);
        }
    }
    out.join("\n")
}

/// Split a migration section into individual statements on `;` boundaries.
///
/// Good enough for DDL: none of our migrations embed semicolons in strings
/// or triggers.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    #[test]
    fn extract_up_keeps_only_up_section() {
        let text = "-- +migrate Up\nCREATE TABLE t (id TEXT);\n-- +migrate Down\nDROP TABLE t;\n";
        let up = extract_up(text);
        assert!(up.contains("CREATE TABLE t"));
        assert!(!up.contains("DROP TABLE"));
    }

    #[test]
    fn split_statements_drops_empty() {
        let parts = split_statements("CREATE TABLE a (x TEXT);\n\nCREATE TABLE b (y TEXT);\n");
        assert_eq!(parts.len(), 2);
    }

    #[tokio::test]
    async fn migrations_apply_and_are_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let url =
            database::database_url_for_path(&dir.path().join("migrate.db").to_string_lossy());
        let pool = database::init_pool(&url).await.unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let versions: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.get::<i64, _>(0))
            .collect();
        assert_eq!(versions, vec![1, 2]);

        // The schema is usable after migration.
        sqlx::query("SELECT COUNT(*) FROM jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
    }
}
