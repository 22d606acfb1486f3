use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use storefront_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens a pool whose connections enforce foreign keys, use WAL, and wait up
/// to `busy_timeout_ms` for a competing writer before failing with `SQLITE_BUSY`.
pub async fn connect(settings: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&settings.url)?
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(u64::from(settings.busy_timeout_ms)));

    SqlitePoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
        .connect_with(options)
        .await
}
