use sqlx::{Row, SqliteConnection};
use tracing::info;

use storefront_core::domain::product::{NewProduct, Product, ProductId};

use super::{missing_product, ProductRepository, RepositoryError};
use crate::DbPool;

/// SQLite has no row locks. `BEGIN IMMEDIATE` takes the database write lock
/// before the first read, which serializes stock changes the same way
/// `SELECT ... FOR UPDATE` would.
pub(crate) const BEGIN_LOCKED: &str = "BEGIN IMMEDIATE";

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Result<Product, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let price: i64 = row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity: i64 =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Product { id: ProductId(id), name, price, quantity })
}

pub(crate) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query("SELECT id, name, price, quantity FROM product WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_product).transpose()
}

pub(crate) async fn write_quantity(
    conn: &mut SqliteConnection,
    product: &Product,
) -> Result<(), RepositoryError> {
    product.validate()?;

    let updated = sqlx::query("UPDATE product SET quantity = ? WHERE id = ?")
        .bind(product.quantity)
        .bind(product.id.0)
        .execute(&mut *conn)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(missing_product(product.id));
    }
    Ok(())
}

#[async_trait::async_trait]
impl ProductRepository for SqlProductRepository {
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, price, quantity FROM product ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_product).collect::<Result<Vec<_>, _>>()
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        product.validate()?;

        let inserted = sqlx::query("INSERT INTO product (name, price, quantity) VALUES (?, ?, ?)")
            .bind(&product.name)
            .bind(product.price)
            .bind(product.quantity)
            .execute(&self.pool)
            .await?;

        let product = product.into_product(ProductId(inserted.last_insert_rowid()));
        info!(
            event_name = "catalog.product.created",
            product_id = product.id.0,
            quantity = product.quantity,
            "product added to catalog"
        );
        Ok(product)
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        product.validate()?;

        sqlx::query(
            "INSERT INTO product (id, name, price, quantity)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 price = excluded.price,
                 quantity = excluded.quantity",
        )
        .bind(product.id.0)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let deleted =
            sqlx::query("DELETE FROM product WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        Ok(deleted.rows_affected() > 0)
    }

    async fn buy(&self, id: ProductId, count: u32) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin_with(BEGIN_LOCKED).await?;

        let mut product = fetch_product(&mut tx, id).await?.ok_or_else(|| missing_product(id))?;
        product.buy(count)?;
        write_quantity(&mut tx, &product).await?;

        tx.commit().await?;
        Ok(product)
    }
}
