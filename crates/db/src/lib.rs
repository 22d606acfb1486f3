pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, DbPool};
pub use fixtures::{DemoCatalog, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryStorefront, ProductRepository, PurchaseRepository, RepositoryError,
    SqlProductRepository, SqlPurchaseRepository,
};
