use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, SoftDelete, entity_id};

entity_id!(
    /// Product identifier.
    ProductId
);

/// Stable external product code. Batch codes are derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn parse(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("sku cannot contain whitespace"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Sku {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input for registering a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    /// Price in smallest currency unit (e.g., cents). Informational only.
    pub unit_price: i64,
    pub sku: String,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    description: String,
    unit_price: i64,
    sku: Sku,
    deleted: bool,
}

impl Product {
    /// Validate registration input and build a live product.
    pub fn register(id: ProductId, input: NewProduct) -> DomainResult<Self> {
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if input.unit_price < 0 {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        let sku = Sku::parse(input.sku)?;

        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: input.description,
            unit_price: input.unit_price,
            sku,
            deleted: false,
        })
    }

    /// Rebuild a product from persisted columns (no validation).
    pub fn restore(
        id: ProductId,
        name: String,
        description: String,
        unit_price: i64,
        sku: Sku,
        deleted: bool,
    ) -> Self {
        Self {
            id,
            name,
            description,
            unit_price,
            sku,
            deleted,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit_price(&self) -> i64 {
        self.unit_price
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SoftDelete for Product {
    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(sku: &str) -> NewProduct {
        NewProduct {
            name: "Whole milk 1L".to_string(),
            description: "Pasteurised".to_string(),
            unit_price: 250,
            sku: sku.to_string(),
        }
    }

    #[test]
    fn register_trims_sku_and_name() {
        let mut raw = input("  SKU1 ");
        raw.name = "  Whole milk 1L ".to_string();
        let product = Product::register(ProductId::generate(), raw).unwrap();
        assert_eq!(product.sku().as_str(), "SKU1");
        assert_eq!(product.name(), "Whole milk 1L");
        assert!(product.is_active());
    }

    #[test]
    fn blank_sku_is_rejected() {
        let err = Product::register(ProductId::generate(), input("   ")).unwrap_err();
        assert_eq!(err, DomainError::validation("sku cannot be empty"));
    }

    #[test]
    fn sku_with_inner_whitespace_is_rejected() {
        let err = Sku::parse("SK U1").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut raw = input("SKU1");
        raw.unit_price = -1;
        let err = Product::register(ProductId::generate(), raw).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("unit_price")));
    }

    #[test]
    fn mark_deleted_hides_product() {
        let mut product = Product::register(ProductId::generate(), input("SKU1")).unwrap();
        product.mark_deleted();
        assert!(product.is_deleted());
        assert!(!product.is_active());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any non-blank, whitespace-free SKU is accepted verbatim.
            #[test]
            fn valid_skus_are_preserved(sku in "[A-Z0-9][A-Z0-9_-]{0,19}") {
                let parsed = Sku::parse(sku.clone()).unwrap();
                prop_assert_eq!(parsed.as_str(), sku.as_str());
            }
        }
    }
}
