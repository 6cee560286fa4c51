//! Transactional storage boundary.
//!
//! Every service operation runs against one [`StoreTx`] obtained from
//! [`InventoryStore::begin`]. Work becomes visible only on [`StoreTx::commit`];
//! [`StoreTx::rollback`] or dropping the handle discards it.
//!
//! Read paths never return logically deleted rows. Each adapter applies the
//! active-row predicate explicitly in every lookup and listing.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use stockledger_core::Page;
use stockledger_inventory::{Batch, BatchId, BatchQuery};
use stockledger_products::{Product, ProductId};
use stockledger_sales::{Sale, SaleId, SaleQuery};

use crate::error::ServiceResult;

/// Storage-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    /// A uniqueness rule was violated, typically by a concurrent writer.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a conditional quantity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityUpdate {
    /// The delta was applied; carries the new quantity.
    Applied(i64),
    /// The delta would take the batch below zero; nothing changed.
    Insufficient { available: i64 },
    /// No active batch with that id.
    Missing,
}

/// A source of transactions.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One open unit of work.
#[async_trait]
pub trait StoreTx: Send {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Like [`StoreTx::product`], but holds the row against concurrent batch
    /// creation until the transaction ends.
    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;

    async fn mark_product_deleted(&mut self, id: ProductId) -> StoreResult<()>;

    async fn batch(&mut self, id: BatchId) -> StoreResult<Option<Batch>>;

    /// Highest sequence ever issued for the product, deleted batches included.
    async fn highest_batch_sequence(&mut self, product_id: ProductId) -> StoreResult<Option<i64>>;

    async fn insert_batch(&mut self, batch: &Batch) -> StoreResult<()>;

    /// `quantity += delta` if the result stays non-negative, as one atomic step.
    async fn adjust_quantity(&mut self, id: BatchId, delta: i64) -> StoreResult<QuantityUpdate>;

    async fn list_batches(&mut self, query: &BatchQuery) -> StoreResult<Page<Batch>>;

    async fn mark_batch_deleted(&mut self, id: BatchId) -> StoreResult<()>;

    /// Returns the number of batches flagged.
    async fn mark_product_batches_deleted(&mut self, product_id: ProductId) -> StoreResult<u64>;

    async fn sale(&mut self, id: SaleId) -> StoreResult<Option<Sale>>;

    async fn insert_sale(&mut self, sale: &Sale) -> StoreResult<()>;

    async fn update_sale(&mut self, sale: &Sale) -> StoreResult<()>;

    async fn mark_sale_deleted(&mut self, id: SaleId) -> StoreResult<()>;

    /// Returns the number of sales flagged.
    async fn mark_batch_sales_deleted(&mut self, batch_id: BatchId) -> StoreResult<u64>;

    async fn count_product_sales(&mut self, product_id: ProductId) -> StoreResult<u64>;

    async fn list_sales(&mut self, query: &SaleQuery) -> StoreResult<Page<Sale>>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Commit on `Ok`, roll back on `Err`.
///
/// A failed rollback is logged; the caller still gets the original error.
pub(crate) async fn settle<T, X: StoreTx>(
    tx: X,
    operation: &'static str,
    result: ServiceResult<T>,
) -> ServiceResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            warn!(operation, error = %err, "transaction rolled back");
            if let Err(rollback) = tx.rollback().await {
                warn!(operation, error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Finish a read-only unit of work.
pub(crate) async fn release<T, X: StoreTx>(tx: X, result: ServiceResult<T>) -> ServiceResult<T> {
    tx.rollback().await?;
    result
}
