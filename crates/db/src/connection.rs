use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens a pool against `database_url`, creating the database file when it is missing.
///
/// Foreign keys are enforced on every connection; transactions reference `users(id)`.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await?;

    debug!(
        event_name = "system.db.connected",
        max_connections = max_connections.max(1),
        "database pool ready"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::connect_with_settings;

    #[tokio::test]
    async fn enables_foreign_keys_on_pooled_connections() {
        let pool = connect_with_settings("sqlite::memory:", 2, 5).await.expect("connect");
        let enabled: i64 = sqlx::query("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma")
            .get(0);
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn creates_missing_database_file() {
        let dir = std::env::temp_dir().join(format!("flowmaster-db-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("fresh.db");
        let _ = std::fs::remove_file(&path);

        let pool = connect_with_settings(&format!("sqlite://{}", path.display()), 1, 5)
            .await
            .expect("connect creates file");
        pool.close().await;

        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejects_malformed_urls() {
        let result = connect_with_settings("postgres://nope", 1, 1).await;
        assert!(result.is_err());
    }
}
