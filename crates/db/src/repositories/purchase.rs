use chrono::Utc;
use sqlx::Row;
use tracing::{info, warn};

use storefront_core::domain::product::ProductId;
use storefront_core::domain::purchase::{NewPurchase, Purchase, PurchaseId};

use super::product::{fetch_product, write_quantity, BEGIN_LOCKED};
use super::{
    format_timestamp, missing_product, parse_timestamp, PurchaseRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlPurchaseRepository {
    pool: DbPool,
}

impl SqlPurchaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_purchase(row: &sqlx::sqlite::SqliteRow) -> Result<Purchase, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let product_id: i64 =
        row.try_get("product_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let person: String =
        row.try_get("person").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let address: String =
        row.try_get("address").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let date_str: String =
        row.try_get("date").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Purchase {
        id: PurchaseId(id),
        product_id: ProductId(product_id),
        person,
        address,
        date: parse_timestamp(&date_str)?,
    })
}

#[async_trait::async_trait]
impl PurchaseRepository for SqlPurchaseRepository {
    async fn create(&self, request: NewPurchase) -> Result<Purchase, RepositoryError> {
        let product_id = request.validate()?;

        // Dropping `tx` on any early return rolls back both writes.
        let mut tx = self.pool.begin_with(BEGIN_LOCKED).await?;

        let mut product = fetch_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| missing_product(product_id))?;

        if let Err(error) = product.buy(1) {
            warn!(
                event_name = "orders.purchase.rejected",
                product_id = product_id.0,
                available = product.quantity,
                "purchase rejected: insufficient stock"
            );
            return Err(error.into());
        }
        write_quantity(&mut tx, &product).await?;

        let date = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO purchase (product_id, person, address, date) VALUES (?, ?, ?, ?)",
        )
        .bind(product_id.0)
        .bind(&request.person)
        .bind(&request.address)
        .bind(format_timestamp(&date))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let purchase =
            request.into_purchase(PurchaseId(inserted.last_insert_rowid()), product_id, date);
        info!(
            event_name = "orders.purchase.committed",
            purchase_id = purchase.id.0,
            product_id = product_id.0,
            remaining = product.quantity,
            "purchase committed"
        );
        Ok(purchase)
    }

    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, product_id, person, address, date FROM purchase WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_purchase).transpose()
    }

    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, product_id, person, address, date
             FROM purchase WHERE product_id = ? ORDER BY date ASC, id ASC",
        )
        .bind(product_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_purchase).collect::<Result<Vec<_>, _>>()
    }

    async fn latest(&self) -> Result<Option<Purchase>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, product_id, person, address, date
             FROM purchase ORDER BY date DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_purchase).transpose()
    }
}
