use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Demo catalog: one entry per listing state the shop renders (plenty, a
/// couple left, sold out).
const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct { name: "Телефон", price: 30_000, quantity: 7 },
    DemoProduct { name: "Наушники", price: 5_000, quantity: 0 },
    DemoProduct { name: "Планшет", price: 25_000, quantity: 2 },
    DemoProduct { name: "Чехол", price: 1_500, quantity: 0 },
    DemoProduct { name: "Python Book", price: 1_500, quantity: 5 },
];

#[derive(Clone, Copy, Debug)]
struct DemoProduct {
    name: &'static str,
    price: i64,
    quantity: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub inserted: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub missing: Vec<String>,
}

pub struct DemoCatalog;

impl DemoCatalog {
    /// Inserts every demo product whose name is not in the catalog yet.
    /// Existing rows, including their stock, are left alone.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        let mut result = SeedResult::default();

        for product in DEMO_PRODUCTS {
            let inserted = sqlx::query(
                "INSERT INTO product (name, price, quantity)
                 SELECT ?, ?, ?
                 WHERE NOT EXISTS (SELECT 1 FROM product WHERE name = ?)",
            )
            .bind(product.name)
            .bind(product.price)
            .bind(product.quantity)
            .bind(product.name)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() > 0 {
                result.inserted.push(product.name.to_string());
            } else {
                result.skipped.push(product.name.to_string());
            }
        }

        tx.commit().await?;
        Ok(result)
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut missing = Vec::new();
        for product in DEMO_PRODUCTS {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product WHERE name = ?")
                .bind(product.name)
                .fetch_one(pool)
                .await?;
            if count == 0 {
                missing.push(product.name.to_string());
            }
        }

        Ok(VerificationResult { all_present: missing.is_empty(), missing })
    }

    pub fn product_names() -> impl Iterator<Item = &'static str> {
        DEMO_PRODUCTS.iter().map(|product| product.name)
    }
}
