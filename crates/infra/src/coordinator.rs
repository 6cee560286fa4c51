//! Sale transaction coordinator.
//!
//! Every sale mutation and the cascading deletions run as one transaction:
//! look up, check, move stock through the ledger, persist. Any failure rolls
//! back quantities and sale rows together.
//!
//! The availability checks made here give early, descriptive errors. The
//! store's conditional quantity update is what actually prevents overselling.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument};

use stockledger_core::{Clock, DomainError};
use stockledger_inventory::{Batch, BatchId};
use stockledger_products::ProductId;
use stockledger_sales::{Sale, SaleId, SaleRequest, plan_create, plan_delete, plan_update};

use crate::error::ServiceResult;
use crate::ledger;
use crate::store::{InventoryStore, StoreTx, settle};

/// Counts of rows flagged by a cascading deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cascade {
    pub batches: u64,
    pub sales: u64,
}

async fn load_batch<T: StoreTx>(tx: &mut T, id: BatchId) -> ServiceResult<Batch> {
    tx.batch(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("batch {id}")).into())
}

async fn load_sale<T: StoreTx>(tx: &mut T, id: SaleId) -> ServiceResult<Sale> {
    tx.sale(id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("sale {id}")).into())
}

/// The product must exist and own the batch.
async fn ensure_ownership<T: StoreTx>(tx: &mut T, product_id: ProductId, batch: &Batch) -> ServiceResult<()> {
    if tx.product(product_id).await?.is_none() {
        return Err(DomainError::not_found(format!("product {product_id}")).into());
    }
    if batch.product_id() != product_id {
        return Err(DomainError::validation(format!(
            "batch {} does not belong to product {product_id}",
            batch.batch_code()
        ))
        .into());
    }
    Ok(())
}

async fn create_in<T: StoreTx>(
    tx: &mut T,
    request: SaleRequest,
    today: NaiveDate,
    created_at: chrono::DateTime<chrono::Utc>,
) -> ServiceResult<Sale> {
    let batch = load_batch(tx, request.batch_id).await?;
    batch.ensure_not_expired(today)?;
    if request.quantity > batch.quantity() {
        return Err(DomainError::insufficient_stock(batch.quantity(), request.quantity).into());
    }
    request.validate()?;
    ensure_ownership(tx, request.product_id, &batch).await?;

    let take = plan_create(&request);
    ledger::adjust_quantity(tx, take.batch_id, take.delta).await?;

    let sale = Sale::record(SaleId::generate(), request, created_at)?;
    tx.insert_sale(&sale).await?;
    Ok(sale)
}

async fn update_in<T: StoreTx>(
    tx: &mut T,
    id: SaleId,
    request: SaleRequest,
    today: NaiveDate,
) -> ServiceResult<Sale> {
    let mut sale = load_sale(tx, id).await?;
    request.validate()?;
    let plan = plan_update(&sale, &request);

    let target = load_batch(tx, request.batch_id).await?;
    if !plan.is_noop() {
        target.ensure_not_expired(today)?;
        plan.ensure_available(target.quantity())?;
        for step in &plan.adjustments {
            ledger::adjust_quantity(tx, step.batch_id, step.delta).await?;
        }
    }

    ensure_ownership(tx, request.product_id, &target).await?;
    sale.apply_update(request)?;
    tx.update_sale(&sale).await?;
    Ok(sale)
}

async fn delete_in<T: StoreTx>(tx: &mut T, id: SaleId) -> ServiceResult<Sale> {
    let sale = load_sale(tx, id).await?;
    let restore = plan_delete(&sale);
    ledger::adjust_quantity(tx, restore.batch_id, restore.delta).await?;
    tx.mark_sale_deleted(id).await?;
    Ok(sale)
}

async fn delete_batch_in<T: StoreTx>(tx: &mut T, id: BatchId) -> ServiceResult<Cascade> {
    load_batch(tx, id).await?;
    // Sales go with the batch; their stock is not given back.
    let sales = tx.mark_batch_sales_deleted(id).await?;
    tx.mark_batch_deleted(id).await?;
    Ok(Cascade { batches: 1, sales })
}

async fn delete_product_in<T: StoreTx>(tx: &mut T, id: ProductId) -> ServiceResult<Cascade> {
    // Held until commit so no sale can land between the count and the flagging.
    if tx.lock_product(id).await?.is_none() {
        return Err(DomainError::not_found(format!("product {id}")).into());
    }
    let sales = tx.count_product_sales(id).await?;
    if sales > 0 {
        return Err(DomainError::conflict(format!("product {id} is referenced by {sales} sale(s)")).into());
    }
    let batches = tx.mark_product_batches_deleted(id).await?;
    tx.mark_product_deleted(id).await?;
    Ok(Cascade { batches, sales: 0 })
}

#[derive(Debug)]
pub struct SaleCoordinator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for SaleCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: InventoryStore> SaleCoordinator<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[instrument(
        skip(self, request),
        fields(batch_id = %request.batch_id, quantity = request.quantity),
        err
    )]
    pub async fn create_sale(&self, request: SaleRequest) -> ServiceResult<Sale> {
        let mut tx = self.store.begin().await?;
        let result = create_in(&mut tx, request, self.clock.today(), self.clock.now()).await;
        let sale = settle(tx, "create_sale", result).await?;
        info!(
            sale_id = %sale.id_typed(),
            total_amount = sale.total_amount(),
            "sale created"
        );
        Ok(sale)
    }

    #[instrument(
        skip(self, request),
        fields(batch_id = %request.batch_id, quantity = request.quantity),
        err
    )]
    pub async fn update_sale(&self, id: SaleId, request: SaleRequest) -> ServiceResult<Sale> {
        let mut tx = self.store.begin().await?;
        let result = update_in(&mut tx, id, request, self.clock.today()).await;
        let sale = settle(tx, "update_sale", result).await?;
        info!(sale_id = %id, quantity = sale.quantity(), "sale updated");
        Ok(sale)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_sale(&self, id: SaleId) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let result = delete_in(&mut tx, id).await;
        let sale = settle(tx, "delete_sale", result).await?;
        info!(
            sale_id = %id,
            batch_id = %sale.batch_id(),
            restored = sale.quantity(),
            "sale deleted"
        );
        Ok(())
    }

    /// Logically delete a batch and every sale recorded against it.
    #[instrument(skip(self), err)]
    pub async fn delete_batch(&self, id: BatchId) -> ServiceResult<Cascade> {
        let mut tx = self.store.begin().await?;
        let result = delete_batch_in(&mut tx, id).await;
        let cascade = settle(tx, "delete_batch", result).await?;
        info!(batch_id = %id, sales = cascade.sales, "batch deleted");
        Ok(cascade)
    }

    /// Logically delete a product and its batches. Refused while any live sale
    /// references the product.
    #[instrument(skip(self), err)]
    pub async fn delete_product(&self, id: ProductId) -> ServiceResult<Cascade> {
        let mut tx = self.store.begin().await?;
        let result = delete_product_in(&mut tx, id).await;
        let cascade = settle(tx, "delete_product", result).await?;
        info!(product_id = %id, batches = cascade.batches, "product deleted");
        Ok(cascade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductCatalog;
    use crate::error::ServiceError;
    use crate::ledger::InventoryLedger;
    use crate::query::BatchQueryEngine;
    use crate::store::InMemoryStore;
    use stockledger_core::FixedClock;
    use stockledger_inventory::NewBatch;
    use stockledger_products::NewProduct;
    use stockledger_sales::{SaleFilter, SaleQuery};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        day(2025, 3, 10)
    }

    struct Fixture {
        coordinator: SaleCoordinator<InMemoryStore>,
        ledger: InventoryLedger<InMemoryStore>,
        queries: BatchQueryEngine<InMemoryStore>,
        catalog: ProductCatalog<InMemoryStore>,
        product: ProductId,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(today()));
            let catalog = ProductCatalog::new(Arc::clone(&store));
            let product = catalog
                .register_product(NewProduct {
                    name: "Milk".to_string(),
                    description: String::new(),
                    unit_price: 150,
                    sku: "MLK".to_string(),
                })
                .await
                .unwrap()
                .id_typed();
            Self {
                coordinator: SaleCoordinator::new(Arc::clone(&store), Arc::clone(&clock)),
                ledger: InventoryLedger::new(Arc::clone(&store), Arc::clone(&clock)),
                queries: BatchQueryEngine::new(store, clock),
                catalog,
                product,
            }
        }

        async fn batch(&self, quantity: i64, expiry: Option<NaiveDate>) -> BatchId {
            self.batch_for(self.product, quantity, expiry).await
        }

        async fn batch_for(&self, product: ProductId, quantity: i64, expiry: Option<NaiveDate>) -> BatchId {
            self.ledger
                .record_batch(NewBatch {
                    product_id: product,
                    quantity,
                    entry_date: day(2025, 1, 1),
                    expiry_date: expiry,
                })
                .await
                .unwrap()
                .id_typed()
        }

        fn request(&self, batch_id: BatchId, quantity: i64) -> SaleRequest {
            SaleRequest {
                product_id: self.product,
                batch_id,
                quantity,
                selling_price: 200,
                sale_date: today(),
            }
        }

        async fn qty(&self, batch_id: BatchId) -> i64 {
            self.ledger.available_quantity(batch_id).await.unwrap()
        }
    }

    fn domain(err: ServiceError) -> DomainError {
        match err {
            ServiceError::Domain(err) => err,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_checks_run_in_order() {
        let f = Fixture::new().await;
        let expired = f.batch(5, Some(today())).await;

        // Expired wins over a bad quantity.
        let err = f.coordinator.create_sale(f.request(expired, 0)).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::ExpiredBatch { .. }));

        // Missing batch wins over everything.
        let err = f.coordinator.create_sale(f.request(BatchId::generate(), 0)).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound(_)));

        let fresh = f.batch(5, None).await;
        let err = f.coordinator.create_sale(f.request(fresh, 6)).await.unwrap_err();
        assert_eq!(domain(err), DomainError::insufficient_stock(5, 6));

        let mut free = f.request(fresh, 1);
        free.selling_price = 0;
        let err = f.coordinator.create_sale(free).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
        assert_eq!(f.qty(fresh).await, 5);
    }

    #[tokio::test]
    async fn create_rejects_batch_of_another_product() {
        let f = Fixture::new().await;
        let other = f
            .catalog
            .register_product(NewProduct {
                name: "Cream".to_string(),
                description: String::new(),
                unit_price: 90,
                sku: "CRM".to_string(),
            })
            .await
            .unwrap()
            .id_typed();
        let foreign = f.batch_for(other, 5, None).await;

        let err = f.coordinator.create_sale(f.request(foreign, 1)).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
        assert_eq!(f.qty(foreign).await, 5);

        let mut ghost = f.request(foreign, 1);
        ghost.product_id = ProductId::generate();
        assert!(f.coordinator.create_sale(ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn moving_a_sale_credits_old_batch_and_debits_new() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let b = f.batch(5, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        let moved = f
            .coordinator
            .update_sale(sale.id_typed(), f.request(b, 3))
            .await
            .unwrap();
        assert_eq!(moved.batch_id(), b);
        assert_eq!(moved.created_at(), sale.created_at());
        assert_eq!(f.qty(a).await, 10);
        assert_eq!(f.qty(b).await, 2);
    }

    #[tokio::test]
    async fn moving_a_sale_to_a_short_batch_changes_nothing() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let b = f.batch(2, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        let err = f
            .coordinator
            .update_sale(sale.id_typed(), f.request(b, 3))
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::insufficient_stock(2, 3));
        assert_eq!(f.qty(a).await, 6);
        assert_eq!(f.qty(b).await, 2);
        assert_eq!(f.queries.sale(sale.id_typed()).await.unwrap(), Some(sale));
    }

    #[tokio::test]
    async fn moving_a_sale_to_an_expired_batch_is_refused() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let stale = f.batch(10, Some(day(2025, 3, 1))).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        let err = f
            .coordinator
            .update_sale(sale.id_typed(), f.request(stale, 4))
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::ExpiredBatch { .. }));
        assert_eq!(f.qty(a).await, 6);
    }

    #[tokio::test]
    async fn price_only_update_moves_no_stock() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        let mut request = f.request(a, 4);
        request.selling_price = 999;
        request.sale_date = day(2025, 3, 9);
        let updated = f.coordinator.update_sale(sale.id_typed(), request).await.unwrap();
        assert_eq!(updated.selling_price(), 999);
        assert_eq!(updated.total_amount(), 4 * 999);
        assert_eq!(f.qty(a).await, 6);
    }

    #[tokio::test]
    async fn invalid_update_is_refused_before_stock_moves() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let b = f.batch(10, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        for request in [f.request(a, 0), f.request(a, i64::MIN), f.request(b, i64::MIN)] {
            let err = f.coordinator.update_sale(sale.id_typed(), request).await.unwrap_err();
            assert!(matches!(domain(err), DomainError::Validation(_)));
        }
        assert_eq!(f.qty(a).await, 6);
        assert_eq!(f.qty(b).await, 10);
        assert_eq!(f.queries.sale(sale.id_typed()).await.unwrap(), Some(sale));
    }

    #[tokio::test]
    async fn same_batch_update_beyond_effective_stock_changes_nothing() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        // 6 left on the batch plus the 4 the sale holds.
        let err = f
            .coordinator
            .update_sale(sale.id_typed(), f.request(a, 11))
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::insufficient_stock(10, 11));
        assert_eq!(f.qty(a).await, 6);
        assert_eq!(f.queries.sale(sale.id_typed()).await.unwrap(), Some(sale.clone()));

        let updated = f
            .coordinator
            .update_sale(sale.id_typed(), f.request(a, 10))
            .await
            .unwrap();
        assert_eq!(updated.quantity(), 10);
        assert_eq!(f.qty(a).await, 0);
    }

    #[tokio::test]
    async fn deleted_sale_is_gone_and_cannot_be_deleted_twice() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 4)).await.unwrap();

        f.coordinator.delete_sale(sale.id_typed()).await.unwrap();
        assert_eq!(f.qty(a).await, 10);
        assert_eq!(f.queries.sale(sale.id_typed()).await.unwrap(), None);

        let err = f.coordinator.delete_sale(sale.id_typed()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.qty(a).await, 10);

        let err = f
            .coordinator
            .update_sale(sale.id_typed(), f.request(a, 1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn deleting_a_batch_takes_its_sales_without_restoring_stock() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let b = f.batch(10, None).await;
        f.coordinator.create_sale(f.request(a, 2)).await.unwrap();
        f.coordinator.create_sale(f.request(a, 3)).await.unwrap();
        let kept = f.coordinator.create_sale(f.request(b, 1)).await.unwrap();

        let cascade = f.coordinator.delete_batch(a).await.unwrap();
        assert_eq!(cascade, Cascade { batches: 1, sales: 2 });
        assert_eq!(f.queries.batch(a).await.unwrap(), None);

        let remaining = f
            .queries
            .list_sales(SaleQuery::new(SaleFilter::for_product(f.product)))
            .await
            .unwrap();
        assert_eq!(remaining.items, vec![kept]);

        assert!(f.coordinator.delete_batch(a).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn product_with_live_sales_cannot_be_deleted() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;
        let b = f.batch(3, None).await;
        let sale = f.coordinator.create_sale(f.request(a, 2)).await.unwrap();

        let err = f.coordinator.delete_product(f.product).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Conflict(_)));
        assert!(f.queries.batch(a).await.unwrap().is_some());

        f.coordinator.delete_sale(sale.id_typed()).await.unwrap();
        let cascade = f.coordinator.delete_product(f.product).await.unwrap();
        assert_eq!(cascade.batches, 2);
        assert_eq!(f.catalog.product(f.product).await.unwrap(), None);
        assert_eq!(f.queries.batch(b).await.unwrap(), None);
        assert!(f.queries.available_batches(f.product).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn racing_sale_and_product_deletion_stay_consistent() {
        let f = Fixture::new().await;
        let a = f.batch(10, None).await;

        let (deleted, sold) = tokio::join!(
            f.coordinator.delete_product(f.product),
            f.coordinator.create_sale(f.request(a, 2)),
        );
        assert!(deleted.is_ok() != sold.is_ok());

        let live_sales = f
            .queries
            .list_sales(SaleQuery::new(SaleFilter::for_product(f.product)))
            .await
            .unwrap()
            .total;
        if deleted.is_ok() {
            assert!(sold.unwrap_err().is_not_found());
            assert_eq!(live_sales, 0);
            assert_eq!(f.queries.batch(a).await.unwrap(), None);
        } else {
            assert!(matches!(domain(deleted.unwrap_err()), DomainError::Conflict(_)));
            assert_eq!(live_sales, 1);
            assert_eq!(f.qty(a).await, 8);
        }
    }

    #[tokio::test]
    async fn codes_are_not_reused_after_batch_deletion() {
        let f = Fixture::new().await;
        let a = f.batch(1, None).await;
        f.coordinator.delete_batch(a).await.unwrap();
        let next = f.batch(1, None).await;
        let next = f.queries.batch(next).await.unwrap().unwrap();
        assert_eq!(next.batch_code().as_str(), "MLK-2");
    }
}
