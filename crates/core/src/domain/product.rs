use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const MAX_NAME_LEN: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog entry. `price` is in whole roubles, the smallest unit the shop quotes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: i64,
    pub quantity: i64,
}

/// Administrative input for a product that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub quantity: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        Self { name: name.into(), price, quantity: 0 }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(&self.name, self.price, self.quantity)
    }

    pub fn into_product(self, id: ProductId) -> Product {
        Product { id, name: self.name, price: self.price, quantity: self.quantity }
    }
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    pub fn can_buy(&self, count: u32) -> bool {
        self.quantity >= i64::from(count)
    }

    /// Takes `count` units out of stock.
    ///
    /// Leaves the product untouched when there is not enough stock. Callers
    /// persist the new `quantity` themselves, and only that column.
    pub fn buy(&mut self, count: u32) -> Result<(), DomainError> {
        if !self.can_buy(count) {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                name: self.name.clone(),
                requested: count,
                available: self.quantity,
            });
        }

        self.quantity -= i64::from(count);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(&self.name, self.price, self.quantity)
    }
}

fn validate_fields(name: &str, price: i64, quantity: i64) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::Validation("product name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::Validation(format!(
            "product name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if price < 0 {
        return Err(DomainError::Validation("price cannot be negative".to_string()));
    }
    if quantity < 0 {
        return Err(DomainError::Validation("quantity cannot be negative".to_string()));
    }
    Ok(())
}
