use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::Mutex;

use storefront_core::domain::product::{NewProduct, Product, ProductId};
use storefront_core::domain::purchase::{NewPurchase, Purchase, PurchaseId};

use super::{missing_product, ProductRepository, PurchaseRepository, RepositoryError};

/// Catalog and order intake backed by maps. One mutex guards both tables, so
/// holding it plays the part of the product lock in the purchase protocol.
#[derive(Default)]
pub struct InMemoryStorefront {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    products: BTreeMap<ProductId, Product>,
    purchases: BTreeMap<PurchaseId, Purchase>,
    next_product_id: i64,
    next_purchase_id: i64,
    quantity_writes: u64,
}

impl StoreState {
    fn allocate_product_id(&mut self) -> ProductId {
        self.next_product_id += 1;
        ProductId(self.next_product_id)
    }

    fn allocate_purchase_id(&mut self) -> PurchaseId {
        self.next_purchase_id += 1;
        PurchaseId(self.next_purchase_id)
    }

    fn locked_buy(&mut self, id: ProductId, count: u32) -> Result<Product, RepositoryError> {
        let product = self.products.get_mut(&id).ok_or_else(|| missing_product(id))?;
        product.buy(count)?;
        self.quantity_writes += 1;
        Ok(product.clone())
    }
}

impl InMemoryStorefront {
    /// Number of stock decrements written so far.
    pub async fn quantity_writes(&self) -> u64 {
        self.state.lock().await.quantity_writes
    }
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryStorefront {
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.products.values().cloned().collect())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.products.get(&id).cloned())
    }

    async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        product.validate()?;
        let mut state = self.state.lock().await;
        let product = product.into_product(state.allocate_product_id());
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        product.validate()?;
        let mut state = self.state.lock().await;
        state.next_product_id = state.next_product_id.max(product.id.0);
        state.products.insert(product.id, product);
        Ok(())
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let existed = state.products.remove(&id).is_some();
        state.purchases.retain(|_, purchase| purchase.product_id != id);
        Ok(existed)
    }

    async fn buy(&self, id: ProductId, count: u32) -> Result<Product, RepositoryError> {
        self.state.lock().await.locked_buy(id, count)
    }
}

#[async_trait::async_trait]
impl PurchaseRepository for InMemoryStorefront {
    async fn create(&self, request: NewPurchase) -> Result<Purchase, RepositoryError> {
        let product_id = request.validate()?;

        let mut state = self.state.lock().await;
        state.locked_buy(product_id, 1)?;

        let purchase = request.into_purchase(state.allocate_purchase_id(), product_id, Utc::now());
        state.purchases.insert(purchase.id, purchase.clone());
        Ok(purchase)
    }

    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.purchases.get(&id).cloned())
    }

    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Purchase>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .purchases
            .values()
            .filter(|purchase| purchase.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn latest(&self) -> Result<Option<Purchase>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.purchases.values().next_back().cloned())
    }
}
