//! `GET /health`: whether the shop can take orders right now. Ready means the
//! database answers and every migration is applied.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use storefront_db::{migrations, DbPool};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub ready: bool,
    pub database: Check,
    pub schema: Check,
    /// Present once the schema is in place.
    pub catalog: Option<CatalogSummary>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Check {
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn passed(detail: impl Into<String>) -> Self {
        Self { ok: true, detail: detail.into() }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self { ok: false, detail: detail.into() }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CatalogSummary {
    pub products: i64,
    pub in_stock: i64,
    pub units: i64,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(db_pool)
}

async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::collect(&pool).await;
    let status = if report.ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}

impl HealthReport {
    pub async fn collect(pool: &DbPool) -> Self {
        let database = match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => Check::passed("reachable"),
            Err(error) => Check::failed(format!("unreachable: {error}")),
        };

        let schema = if !database.ok {
            Check::failed("not checked")
        } else {
            match migrations::pending_count(pool).await {
                Ok(0) => Check::passed("all migrations applied"),
                Ok(pending) => Check::failed(format!("{pending} migration(s) pending")),
                Err(error) => Check::failed(format!("could not inspect migrations: {error}")),
            }
        };

        let catalog = if schema.ok { catalog_summary(pool).await } else { None };

        Self { ready: database.ok && schema.ok, database, schema, catalog, checked_at: Utc::now() }
    }
}

async fn catalog_summary(pool: &DbPool) -> Option<CatalogSummary> {
    sqlx::query_as::<_, CatalogSummary>(
        "SELECT COUNT(*) AS products,
                COALESCE(SUM(quantity > 0), 0) AS in_stock,
                COALESCE(SUM(quantity), 0) AS units
         FROM product",
    )
    .fetch_one(pool)
    .await
    .map_err(|error| {
        tracing::warn!(
            event_name = "system.health.catalog_unreadable",
            error = %error,
            "catalog summary query failed"
        );
    })
    .ok()
}
