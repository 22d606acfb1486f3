use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::errors::DomainError;

pub const MAX_FIELD_LEN: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PurchaseId(pub i64);

/// One unit of one product, bought by `person`. Never updated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub product_id: ProductId,
    pub person: String,
    pub address: String,
    pub date: DateTime<Utc>,
}

/// Buyer-supplied purchase request. The product reference is optional here so
/// that a request without one is rejected by validation rather than by type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub product_id: Option<ProductId>,
    pub person: String,
    pub address: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurchaseField {
    Person,
    Address,
}

impl PurchaseField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Address => "address",
        }
    }
}

impl NewPurchase {
    pub fn new(
        product_id: ProductId,
        person: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self { product_id: Some(product_id), person: person.into(), address: address.into() }
    }

    /// Per-field problems with the buyer details, in form order.
    pub fn field_errors(&self) -> Vec<(PurchaseField, String)> {
        let mut errors = Vec::new();
        for (field, value) in
            [(PurchaseField::Person, &self.person), (PurchaseField::Address, &self.address)]
        {
            if value.trim().is_empty() {
                errors.push((field, "This field is required.".to_string()));
            } else if value.chars().count() > MAX_FIELD_LEN {
                errors.push((field, format!("Must be at most {MAX_FIELD_LEN} characters.")));
            }
        }
        errors
    }

    /// Checks the request and returns the product it refers to.
    pub fn validate(&self) -> Result<ProductId, DomainError> {
        let product_id = self.product_id.ok_or_else(|| {
            DomainError::Validation("purchase must reference a product".to_string())
        })?;

        if let Some((field, message)) = self.field_errors().into_iter().next() {
            return Err(DomainError::Validation(format!("{}: {message}", field.as_str())));
        }

        Ok(product_id)
    }

    pub fn into_purchase(
        self,
        id: PurchaseId,
        product_id: ProductId,
        date: DateTime<Utc>,
    ) -> Purchase {
        Purchase { id, product_id, person: self.person, address: self.address, date }
    }
}
