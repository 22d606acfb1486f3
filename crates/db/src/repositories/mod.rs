use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use storefront_core::domain::product::{NewProduct, Product, ProductId};
use storefront_core::domain::purchase::{NewPurchase, Purchase, PurchaseId};
use storefront_core::errors::{ApplicationError, DomainError};

pub mod memory;
pub mod product;
pub mod purchase;

pub use memory::InMemoryStorefront;
pub use product::SqlProductRepository;
pub use purchase::SqlPurchaseRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, Self::Domain(DomainError::InsufficientStock { .. }))
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Domain(error) => Self::Domain(error),
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Decode(message) => Self::Persistence(message),
        }
    }
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Product>, RepositoryError>;
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn insert(&self, product: NewProduct) -> Result<Product, RepositoryError>;
    /// Validates and writes every column of an existing or new product.
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
    /// Returns `false` when no such product existed. Its purchases go with it.
    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;
    /// Locked check-and-decrement. Only the `quantity` column is written.
    async fn buy(&self, id: ProductId, count: u32) -> Result<Product, RepositoryError>;
}

/// Order intake. `create` is the only write: it takes the product lock,
/// decrements stock by one and inserts the purchase in one transaction.
#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn create(&self, request: NewPurchase) -> Result<Purchase, RepositoryError>;
    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, RepositoryError>;
    async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Purchase>, RepositoryError>;
    async fn latest(&self) -> Result<Option<Purchase>, RepositoryError>;
}

pub(crate) fn missing_product(id: ProductId) -> RepositoryError {
    RepositoryError::Domain(DomainError::Validation(format!("product {id} does not exist")))
}

/// Fixed-width RFC 3339 so that text ordering in SQL matches time ordering.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}
