use std::sync::Arc;

use storefront_core::config::DatabaseConfig;
use storefront_core::domain::product::{NewProduct, ProductId};
use storefront_core::domain::purchase::NewPurchase;
use storefront_db::{
    connect, migrations, DbPool, ProductRepository, PurchaseRepository,
    SqlProductRepository, SqlPurchaseRepository,
};
use tempfile::TempDir;

/// File-backed so that every pooled connection sees the same database and
/// really contends for the write lock.
async fn shared_pool(dir: &TempDir) -> DbPool {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("storefront.db").display());
    let settings = DatabaseConfig { url, max_connections: 4, ..DatabaseConfig::default() };
    let pool = connect(&settings).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

async fn race(pool: &DbPool, product_id: ProductId, attempts: usize) -> (usize, usize) {
    let purchases = Arc::new(SqlPurchaseRepository::new(pool.clone()));

    let handles: Vec<_> = (0..attempts)
        .map(|n| {
            let purchases = Arc::clone(&purchases);
            tokio::spawn(async move {
                purchases
                    .create(NewPurchase::new(product_id, format!("buyer-{n}"), "Москва"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.expect("task joined") {
            Ok(_) => succeeded += 1,
            Err(error) if error.is_insufficient_stock() => sold_out += 1,
            Err(error) => panic!("purchase failed for a reason other than stock: {error}"),
        }
    }
    (succeeded, sold_out)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_purchases_sell_exactly_the_stock() {
    let dir = TempDir::new().expect("tempdir");
    let pool = shared_pool(&dir).await;
    let products = SqlProductRepository::new(pool.clone());
    let product = products
        .insert(NewProduct::new("Планшет", 25_000).with_quantity(5))
        .await
        .expect("insert");

    let (succeeded, sold_out) = race(&pool, product.id, 12).await;

    assert_eq!(succeeded, 5, "exactly one purchase per unit in stock");
    assert_eq!(sold_out, 7, "every other attempt reports insufficient stock");

    let remaining = products.find_by_id(product.id).await.expect("find").expect("exists");
    assert_eq!(remaining.quantity, 0);

    let rows = SqlPurchaseRepository::new(pool.clone())
        .list_for_product(product.id)
        .await
        .expect("list purchases");
    assert_eq!(rows.len(), 5);

    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_racing_for_the_last_unit_produce_one_purchase() {
    let dir = TempDir::new().expect("tempdir");
    let pool = shared_pool(&dir).await;
    let products = SqlProductRepository::new(pool.clone());
    let product =
        products.insert(NewProduct::new("Чехол", 1_500).with_quantity(1)).await.expect("insert");

    let (succeeded, sold_out) = race(&pool, product.id, 2).await;

    assert_eq!((succeeded, sold_out), (1, 1));
    let remaining = products.find_by_id(product.id).await.expect("find").expect("exists");
    assert_eq!(remaining.quantity, 0);

    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_direct_buys_never_drive_stock_negative() {
    let dir = TempDir::new().expect("tempdir");
    let pool = shared_pool(&dir).await;
    let products = Arc::new(SqlProductRepository::new(pool.clone()));
    let product = products
        .insert(NewProduct::new("Python Book", 1_500).with_quantity(10))
        .await
        .expect("insert");
    let product_id = product.id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let products = Arc::clone(&products);
            tokio::spawn(async move { products.buy(product_id, 3).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.expect("task joined").is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3, "three buys of three fit into ten units");
    let remaining = products.find_by_id(product_id).await.expect("find").expect("exists");
    assert_eq!(remaining.quantity, 1);

    pool.close().await;
}
