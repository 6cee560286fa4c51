use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, SoftDelete, entity_id};
use stockledger_inventory::BatchId;
use stockledger_products::ProductId;

entity_id!(
    /// Sale identifier.
    SaleId
);

/// Input for creating or rewriting a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRequest {
    pub product_id: ProductId,
    pub batch_id: BatchId,
    pub quantity: i64,
    /// Price per unit in smallest currency unit (e.g., cents).
    pub selling_price: i64,
    pub sale_date: NaiveDate,
}

impl SaleRequest {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.selling_price <= 0 {
            return Err(DomainError::validation("selling_price must be positive"));
        }
        Ok(())
    }
}

/// A recorded sale against one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    id: SaleId,
    product_id: ProductId,
    batch_id: BatchId,
    quantity: i64,
    selling_price: i64,
    sale_date: NaiveDate,
    created_at: DateTime<Utc>,
    deleted: bool,
}

impl Sale {
    pub fn record(id: SaleId, request: SaleRequest, created_at: DateTime<Utc>) -> DomainResult<Self> {
        request.validate()?;
        Ok(Self {
            id,
            product_id: request.product_id,
            batch_id: request.batch_id,
            quantity: request.quantity,
            selling_price: request.selling_price,
            sale_date: request.sale_date,
            created_at,
            deleted: false,
        })
    }

    /// Rebuild a sale from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: SaleId,
        product_id: ProductId,
        batch_id: BatchId,
        quantity: i64,
        selling_price: i64,
        sale_date: NaiveDate,
        created_at: DateTime<Utc>,
        deleted: bool,
    ) -> Self {
        Self {
            id,
            product_id,
            batch_id,
            quantity,
            selling_price,
            sale_date,
            created_at,
            deleted,
        }
    }

    /// Overwrite the editable fields. Identity and creation time are kept.
    pub fn apply_update(&mut self, request: SaleRequest) -> DomainResult<()> {
        request.validate()?;
        self.product_id = request.product_id;
        self.batch_id = request.batch_id;
        self.quantity = request.quantity;
        self.selling_price = request.selling_price;
        self.sale_date = request.sale_date;
        Ok(())
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn selling_price(&self) -> i64 {
        self.selling_price
    }

    pub fn sale_date(&self) -> NaiveDate {
        self.sale_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `quantity × selling_price`, in minor units.
    pub fn total_amount(&self) -> i64 {
        self.quantity.saturating_mul(self.selling_price)
    }
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SoftDelete for Sale {
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

    fn request(quantity: i64, selling_price: i64) -> SaleRequest {
        SaleRequest {
            product_id: ProductId::generate(),
            batch_id: BatchId::generate(),
            quantity,
            selling_price,
            sale_date: NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
        }
    }

    #[test]
    fn total_amount_is_quantity_times_price() {
        let sale = Sale::record(SaleId::generate(), request(4, 125), Utc::now()).unwrap();
        assert_eq!(sale.total_amount(), 500);
    }

    #[test]
    fn quantity_and_price_must_be_positive() {
        assert!(matches!(request(0, 10).validate(), Err(DomainError::Validation(_))));
        assert!(matches!(request(1, 0).validate(), Err(DomainError::Validation(_))));
        assert!(matches!(request(-3, 10).validate(), Err(DomainError::Validation(_))));
        assert!(request(1, 1).validate().is_ok());
    }

    #[test]
    fn update_keeps_identity_and_creation_time() {
        let created = Utc::now();
        let mut sale = Sale::record(SaleId::generate(), request(4, 125), created).unwrap();
        let id = sale.id_typed();

        let next = request(6, 130);
        sale.apply_update(next.clone()).unwrap();
        assert_eq!(sale.id_typed(), id);
        assert_eq!(sale.created_at(), created);
        assert_eq!(sale.batch_id(), next.batch_id);
        assert_eq!(sale.quantity(), 6);
    }

    #[test]
    fn invalid_update_leaves_sale_untouched() {
        let mut sale = Sale::record(SaleId::generate(), request(4, 125), Utc::now()).unwrap();
        let before = sale.clone();
        assert!(sale.apply_update(request(0, 125)).is_err());
        assert_eq!(sale, before);
    }
}
