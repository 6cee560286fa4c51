use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_core::entity::{find_active, find_active_mut};
use stockledger_core::{DomainError, Page, SoftDelete};
use stockledger_inventory::{Batch, BatchId, BatchQuery};
use stockledger_products::{Product, ProductId};
use stockledger_sales::{Sale, SaleId, SaleQuery};

use super::{InventoryStore, QuantityUpdate, StoreError, StoreResult, StoreTx};

/// Rows in insertion order, which is the store order listings fall back to.
#[derive(Debug, Clone, Default)]
struct StoreState {
    products: Vec<Product>,
    batches: Vec<Batch>,
    sales: Vec<Sale>,
}

/// In-memory store.
///
/// Intended for tests/dev. A transaction holds the store lock for its whole
/// lifetime, so transactions are fully serialised.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(InMemoryTx { guard, work: None })
    }
}

/// Reads see the committed state until the first write takes a working copy;
/// the copy is written back on commit.
#[derive(Debug)]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<StoreState>,
    work: Option<StoreState>,
}

impl InMemoryTx {
    fn state(&self) -> &StoreState {
        self.work.as_ref().unwrap_or(&*self.guard)
    }

    fn state_mut(&mut self) -> &mut StoreState {
        let guard = &self.guard;
        self.work.get_or_insert_with(|| (**guard).clone())
    }

    fn active_batch_mut(&mut self, id: BatchId) -> Option<&mut Batch> {
        find_active_mut(&mut self.state_mut().batches, id)
    }
}

fn missing(what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Database(format!("no active {what} {id}"))
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(find_active(&self.state().products, id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        self.product(id).await
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        if self.state().products.iter().any(|p| p.id_typed() == product.id_typed()) {
            return Err(StoreError::Conflict(format!("product {} already exists", product.id_typed())));
        }
        self.state_mut().products.push(product.clone());
        Ok(())
    }

    async fn mark_product_deleted(&mut self, id: ProductId) -> StoreResult<()> {
        let product = find_active_mut(&mut self.state_mut().products, id).ok_or_else(|| missing("product", id))?;
        product.mark_deleted();
        Ok(())
    }

    async fn batch(&mut self, id: BatchId) -> StoreResult<Option<Batch>> {
        Ok(find_active(&self.state().batches, id).cloned())
    }

    async fn highest_batch_sequence(&mut self, product_id: ProductId) -> StoreResult<Option<i64>> {
        Ok(self
            .state()
            .batches
            .iter()
            .filter(|b| b.product_id() == product_id)
            .map(Batch::batch_sequence)
            .max())
    }

    async fn insert_batch(&mut self, batch: &Batch) -> StoreResult<()> {
        let clash = self.state().batches.iter().any(|b| {
            b.id_typed() == batch.id_typed()
                || (b.product_id() == batch.product_id() && b.batch_sequence() == batch.batch_sequence())
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "batch sequence {} already issued for product {}",
                batch.batch_sequence(),
                batch.product_id()
            )));
        }
        self.state_mut().batches.push(batch.clone());
        Ok(())
    }

    async fn adjust_quantity(&mut self, id: BatchId, delta: i64) -> StoreResult<QuantityUpdate> {
        if find_active(&self.state().batches, id).is_none() {
            return Ok(QuantityUpdate::Missing);
        }
        let Some(batch) = self.active_batch_mut(id) else {
            return Ok(QuantityUpdate::Missing);
        };
        match batch.adjust(delta) {
            Ok(next) => Ok(QuantityUpdate::Applied(next)),
            Err(DomainError::InsufficientStock { available, .. }) => {
                Ok(QuantityUpdate::Insufficient { available })
            }
            Err(other) => Err(StoreError::Database(other.to_string())),
        }
    }

    async fn list_batches(&mut self, query: &BatchQuery) -> StoreResult<Page<Batch>> {
        Ok(query.run(&self.state().batches))
    }

    async fn mark_batch_deleted(&mut self, id: BatchId) -> StoreResult<()> {
        let batch = self.active_batch_mut(id).ok_or_else(|| missing("batch", id))?;
        batch.mark_deleted();
        Ok(())
    }

    async fn mark_product_batches_deleted(&mut self, product_id: ProductId) -> StoreResult<u64> {
        let mut flagged = 0;
        for batch in self
            .state_mut()
            .batches
            .iter_mut()
            .filter(|b| b.product_id() == product_id && b.is_active())
        {
            batch.mark_deleted();
            flagged += 1;
        }
        Ok(flagged)
    }

    async fn sale(&mut self, id: SaleId) -> StoreResult<Option<Sale>> {
        Ok(find_active(&self.state().sales, id).cloned())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> StoreResult<()> {
        if self.state().sales.iter().any(|s| s.id_typed() == sale.id_typed()) {
            return Err(StoreError::Conflict(format!("sale {} already exists", sale.id_typed())));
        }
        self.state_mut().sales.push(sale.clone());
        Ok(())
    }

    async fn update_sale(&mut self, sale: &Sale) -> StoreResult<()> {
        let stored = find_active_mut(&mut self.state_mut().sales, sale.id_typed())
            .ok_or_else(|| missing("sale", sale.id_typed()))?;
        *stored = sale.clone();
        Ok(())
    }

    async fn mark_sale_deleted(&mut self, id: SaleId) -> StoreResult<()> {
        let sale = find_active_mut(&mut self.state_mut().sales, id).ok_or_else(|| missing("sale", id))?;
        sale.mark_deleted();
        Ok(())
    }

    async fn mark_batch_sales_deleted(&mut self, batch_id: BatchId) -> StoreResult<u64> {
        let mut flagged = 0;
        for sale in self
            .state_mut()
            .sales
            .iter_mut()
            .filter(|s| s.batch_id() == batch_id && s.is_active())
        {
            sale.mark_deleted();
            flagged += 1;
        }
        Ok(flagged)
    }

    async fn count_product_sales(&mut self, product_id: ProductId) -> StoreResult<u64> {
        Ok(self
            .state()
            .sales
            .iter()
            .filter(|s| s.product_id() == product_id && s.is_active())
            .count() as u64)
    }

    async fn list_sales(&mut self, query: &SaleQuery) -> StoreResult<Page<Sale>> {
        Ok(query.run(&self.state().sales))
    }

    async fn commit(self) -> StoreResult<()> {
        let InMemoryTx { mut guard, work } = self;
        if let Some(work) = work {
            *guard = work;
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
