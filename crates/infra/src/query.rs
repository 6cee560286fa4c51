//! Read-only listings of batches and sales.

use std::sync::Arc;

use tracing::instrument;

use stockledger_core::{Clock, Page, Pagination};
use stockledger_inventory::{Batch, BatchFilter, BatchId, BatchQuery, BatchSort};
use stockledger_products::ProductId;
use stockledger_sales::{Sale, SaleId, SaleQuery};

use crate::error::ServiceResult;
use crate::store::{InventoryStore, StoreTx, release};

/// Batches a new sale may draw from, in store order.
pub async fn available_batches_in<T: StoreTx>(
    tx: &mut T,
    product_id: ProductId,
    today: chrono::NaiveDate,
) -> ServiceResult<Vec<Batch>> {
    let query = BatchQuery::new(product_id, today).with_filter(BatchFilter::sellable());
    Ok(tx.list_batches(&query).await?.items)
}

/// Selectable batches when editing a sale currently on `current_batch_id`.
///
/// The current batch is listed first even when empty, as long as it belongs to
/// the product and has not expired.
pub async fn batches_for_edit_in<T: StoreTx>(
    tx: &mut T,
    product_id: ProductId,
    current_batch_id: BatchId,
    today: chrono::NaiveDate,
) -> ServiceResult<Vec<Batch>> {
    let mut batches = available_batches_in(tx, product_id, today).await?;
    if batches.iter().any(|b| b.id_typed() == current_batch_id) {
        return Ok(batches);
    }
    if let Some(current) = tx.batch(current_batch_id).await? {
        if current.product_id() == product_id && !current.is_expired(today) {
            batches.insert(0, current);
        }
    }
    Ok(batches)
}

#[derive(Debug)]
pub struct BatchQueryEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for BatchQueryEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: InventoryStore> BatchQueryEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Filtered listing for one product. `sort: None` keeps store order and
    /// `pagination: None` returns every match.
    #[instrument(skip(self, filter), err)]
    pub async fn list_batches(
        &self,
        product_id: ProductId,
        filter: BatchFilter,
        sort: Option<BatchSort>,
        pagination: Option<Pagination>,
    ) -> ServiceResult<Page<Batch>> {
        let query = BatchQuery {
            product_id,
            filter,
            sort,
            pagination,
            today: self.clock.today(),
        };
        let mut tx = self.store.begin().await?;
        let result = tx.list_batches(&query).await.map_err(Into::into);
        release(tx, result).await
    }

    pub async fn available_batches(&self, product_id: ProductId) -> ServiceResult<Vec<Batch>> {
        let mut tx = self.store.begin().await?;
        let result = available_batches_in(&mut tx, product_id, self.clock.today()).await;
        release(tx, result).await
    }

    pub async fn batches_for_edit(
        &self,
        product_id: ProductId,
        current_batch_id: BatchId,
    ) -> ServiceResult<Vec<Batch>> {
        let mut tx = self.store.begin().await?;
        let result = batches_for_edit_in(&mut tx, product_id, current_batch_id, self.clock.today()).await;
        release(tx, result).await
    }

    pub async fn batch(&self, id: BatchId) -> ServiceResult<Option<Batch>> {
        let mut tx = self.store.begin().await?;
        let result = tx.batch(id).await.map_err(Into::into);
        release(tx, result).await
    }

    pub async fn sale(&self, id: SaleId) -> ServiceResult<Option<Sale>> {
        let mut tx = self.store.begin().await?;
        let result = tx.sale(id).await.map_err(Into::into);
        release(tx, result).await
    }

    #[instrument(skip(self, query), err)]
    pub async fn list_sales(&self, query: SaleQuery) -> ServiceResult<Page<Sale>> {
        let mut tx = self.store.begin().await?;
        let result = tx.list_sales(&query).await.map_err(Into::into);
        release(tx, result).await
    }
}
