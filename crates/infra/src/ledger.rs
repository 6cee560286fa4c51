//! Inventory ledger: the only path by which batch quantities change.
//!
//! The free functions work inside a caller's transaction and are what the sale
//! coordinator composes. [`InventoryLedger`] wraps each of them in a transaction
//! of its own.

use std::sync::Arc;

use tracing::{info, instrument};

use stockledger_core::{Clock, DomainError};
use stockledger_inventory::{Batch, BatchCode, BatchId, NewBatch, next_batch_code};
use stockledger_products::{Product, ProductId};

use crate::error::ServiceResult;
use crate::store::{InventoryStore, QuantityUpdate, StoreTx, release, settle};

/// Next code and sequence for `product`. Must run in the transaction that
/// inserts the batch.
pub async fn generate_batch_code<T: StoreTx>(tx: &mut T, product: &Product) -> ServiceResult<(BatchCode, i64)> {
    let highest = tx.highest_batch_sequence(product.id_typed()).await?;
    Ok(next_batch_code(product.sku(), highest))
}

/// `quantity += delta`, refusing to go below zero. Returns the new quantity.
pub async fn adjust_quantity<T: StoreTx>(tx: &mut T, batch_id: BatchId, delta: i64) -> ServiceResult<i64> {
    match tx.adjust_quantity(batch_id, delta).await? {
        QuantityUpdate::Applied(quantity) => Ok(quantity),
        QuantityUpdate::Insufficient { available } => {
            Err(DomainError::insufficient_stock(available, delta.saturating_neg()).into())
        }
        QuantityUpdate::Missing => Err(DomainError::not_found(format!("batch {batch_id}")).into()),
    }
}

/// Current quantity, or 0 for an unknown or deleted batch.
pub async fn available_quantity<T: StoreTx>(tx: &mut T, batch_id: BatchId) -> ServiceResult<i64> {
    Ok(tx.batch(batch_id).await?.map_or(0, |batch| batch.quantity()))
}

pub(crate) async fn record_batch_in<T: StoreTx>(tx: &mut T, entry: NewBatch) -> ServiceResult<Batch> {
    let product = tx
        .lock_product(entry.product_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("product {}", entry.product_id)))?;
    entry.validate()?;

    let (code, sequence) = generate_batch_code(tx, &product).await?;
    let batch = Batch::record(BatchId::generate(), entry, code, sequence)?;
    tx.insert_batch(&batch).await?;
    Ok(batch)
}

/// Transaction-owning facade over the ledger operations.
#[derive(Debug)]
pub struct InventoryLedger<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for InventoryLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: InventoryStore> InventoryLedger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Inventory entry: validate, assign the next code, insert.
    #[instrument(skip(self, entry), fields(product_id = %entry.product_id, quantity = entry.quantity), err)]
    pub async fn record_batch(&self, entry: NewBatch) -> ServiceResult<Batch> {
        let mut tx = self.store.begin().await?;
        let result = record_batch_in(&mut tx, entry).await;
        let batch = settle(tx, "record_batch", result).await?;
        info!(
            batch_id = %batch.id_typed(),
            batch_code = %batch.batch_code(),
            status = ?batch.status(self.clock.today()),
            "batch recorded"
        );
        Ok(batch)
    }

    /// Preview the code the next batch of `product_id` would get.
    pub async fn peek_batch_code(&self, product_id: ProductId) -> ServiceResult<(BatchCode, i64)> {
        let mut tx = self.store.begin().await?;
        let result = match tx.product(product_id).await {
            Ok(Some(product)) => generate_batch_code(&mut tx, &product).await,
            Ok(None) => Err(DomainError::not_found(format!("product {product_id}")).into()),
            Err(err) => Err(err.into()),
        };
        release(tx, result).await
    }

    #[instrument(skip(self), err)]
    pub async fn adjust_quantity(&self, batch_id: BatchId, delta: i64) -> ServiceResult<i64> {
        let mut tx = self.store.begin().await?;
        let result = adjust_quantity(&mut tx, batch_id, delta).await;
        let quantity = settle(tx, "adjust_quantity", result).await?;
        info!(%batch_id, delta, quantity, "quantity adjusted");
        Ok(quantity)
    }

    pub async fn available_quantity(&self, batch_id: BatchId) -> ServiceResult<i64> {
        let mut tx = self.store.begin().await?;
        let result = available_quantity(&mut tx, batch_id).await;
        release(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductCatalog;
    use crate::error::ServiceError;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use stockledger_core::FixedClock;
    use stockledger_products::NewProduct;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn setup() -> (InventoryLedger<InMemoryStore>, ProductId) {
        let store = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(day(2025, 3, 1)));
        let catalog = ProductCatalog::new(Arc::clone(&store));
        let product = catalog
            .register_product(NewProduct {
                name: "Cheddar".to_string(),
                description: String::new(),
                unit_price: 700,
                sku: "CHD".to_string(),
            })
            .await
            .unwrap();
        (InventoryLedger::new(store, clock), product.id_typed())
    }

    fn entry(product_id: ProductId, quantity: i64) -> NewBatch {
        NewBatch {
            product_id,
            quantity,
            entry_date: day(2025, 2, 1),
            expiry_date: Some(day(2025, 9, 1)),
        }
    }

    #[tokio::test]
    async fn sequences_start_at_one_and_have_no_gaps() {
        let (ledger, product) = setup().await;
        for expected in 1..=5 {
            let batch = ledger.record_batch(entry(product, 3)).await.unwrap();
            assert_eq!(batch.batch_sequence(), expected);
            assert_eq!(batch.batch_code().as_str(), format!("CHD-{expected}"));
        }
        let (code, seq) = ledger.peek_batch_code(product).await.unwrap();
        assert_eq!((code.as_str(), seq), ("CHD-6", 6));
    }

    #[tokio::test]
    async fn invalid_entry_consumes_no_sequence() {
        let (ledger, product) = setup().await;
        let err = ledger.record_batch(entry(product, -1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        let mut bad_dates = entry(product, 1);
        bad_dates.expiry_date = Some(day(2025, 1, 1));
        assert!(ledger.record_batch(bad_dates).await.is_err());

        let batch = ledger.record_batch(entry(product, 1)).await.unwrap();
        assert_eq!(batch.batch_sequence(), 1);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (ledger, _) = setup().await;
        let err = ledger.record_batch(entry(ProductId::generate(), 1)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn adjust_refuses_to_go_negative() {
        let (ledger, product) = setup().await;
        let batch = ledger.record_batch(entry(product, 5)).await.unwrap();

        assert_eq!(ledger.adjust_quantity(batch.id_typed(), -5).await.unwrap(), 0);
        let err = ledger.adjust_quantity(batch.id_typed(), -1).await.unwrap_err();
        assert_eq!(err, ServiceError::Domain(DomainError::insufficient_stock(0, 1)));
        assert_eq!(ledger.available_quantity(batch.id_typed()).await.unwrap(), 0);

        // Zero delta still needs the batch to exist.
        assert_eq!(ledger.adjust_quantity(batch.id_typed(), 0).await.unwrap(), 0);
        assert!(ledger.adjust_quantity(BatchId::generate(), 0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn available_quantity_is_tolerant() {
        let (ledger, _) = setup().await;
        assert_eq!(ledger.available_quantity(BatchId::generate()).await.unwrap(), 0);
    }
}
