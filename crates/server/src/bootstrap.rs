use storefront_core::config::{AppConfig, ConfigError};
use storefront_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::shop::ShopState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub shop: ShopState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("page templates failed to compile: {0}")]
    Templates(#[source] tera::Error),
}

pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        max_connections = config.database.max_connections,
        busy_timeout_ms = config.database.busy_timeout_ms,
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let shop = ShopState::from_pool(db_pool.clone()).map_err(BootstrapError::Templates)?;

    Ok(Application { config, db_pool, shop })
}

#[cfg(test)]
mod tests {
    use storefront_core::config::{AppConfig, DatabaseConfig};

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn with_database(url: &str) -> AppConfig {
        AppConfig {
            database: DatabaseConfig { url: url.to_string(), ..DatabaseConfig::in_memory() },
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_applies_catalog_schema() {
        let app = bootstrap(with_database("sqlite::memory:")).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('product', 'purchase')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("catalog tables should exist after bootstrap");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_database_url() {
        let result = bootstrap(with_database("postgres://localhost/shop")).await;

        match result {
            Err(BootstrapError::Config(error)) => {
                assert!(error.to_string().contains("database.url"));
            }
            Err(other) => panic!("expected config error, got {other}"),
            Ok(_) => panic!("bootstrap should refuse a non-sqlite url"),
        }
    }

    #[tokio::test]
    async fn bootstrap_reports_unreachable_database_file() {
        let url = "sqlite:///nonexistent-dir/storefront/shop.db?mode=ro";
        let result = bootstrap(with_database(url)).await;

        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }
}
