pub mod config;
pub mod domain;
pub mod errors;

pub use domain::product::{NewProduct, Product, ProductId};
pub use domain::purchase::{NewPurchase, Purchase, PurchaseField, PurchaseId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
