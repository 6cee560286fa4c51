//! Product registration and lookup.

use std::sync::Arc;

use tracing::{info, instrument};

use stockledger_products::{NewProduct, Product, ProductId};

use crate::error::ServiceResult;
use crate::store::{InventoryStore, StoreTx, release, settle};

#[derive(Debug)]
pub struct ProductCatalog<S> {
    store: Arc<S>,
}

impl<S> Clone for ProductCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: InventoryStore> ProductCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input), fields(sku = %input.sku), err)]
    pub async fn register_product(&self, input: NewProduct) -> ServiceResult<Product> {
        let product = Product::register(ProductId::generate(), input)?;
        let mut tx = self.store.begin().await?;
        let result = tx.insert_product(&product).await.map_err(Into::into);
        settle(tx, "register_product", result).await?;
        info!(product_id = %product.id_typed(), "product registered");
        Ok(product)
    }

    pub async fn product(&self, id: ProductId) -> ServiceResult<Option<Product>> {
        let mut tx = self.store.begin().await?;
        let result = tx.product(id).await.map_err(Into::into);
        release(tx, result).await
    }
}
