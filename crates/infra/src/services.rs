//! Explicit service wiring: one store handle and one clock shared by every
//! component, built once at process start.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use stockledger_core::{Clock, SystemClock};

use crate::catalog::ProductCatalog;
use crate::config::StoreConfig;
use crate::coordinator::SaleCoordinator;
use crate::ledger::InventoryLedger;
use crate::query::BatchQueryEngine;
use crate::store::{InMemoryStore, InventoryStore, PostgresStore};

/// Every component over one store.
#[derive(Debug)]
pub struct InventoryServices<S> {
    pub catalog: ProductCatalog<S>,
    pub ledger: InventoryLedger<S>,
    pub queries: BatchQueryEngine<S>,
    pub sales: SaleCoordinator<S>,
}

impl<S> Clone for InventoryServices<S> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            ledger: self.ledger.clone(),
            queries: self.queries.clone(),
            sales: self.sales.clone(),
        }
    }
}

impl<S: InventoryStore> InventoryServices<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: ProductCatalog::new(Arc::clone(&store)),
            ledger: InventoryLedger::new(Arc::clone(&store), Arc::clone(&clock)),
            queries: BatchQueryEngine::new(Arc::clone(&store), Arc::clone(&clock)),
            sales: SaleCoordinator::new(store, clock),
        }
    }
}

/// Services for whichever store the configuration selects.
#[derive(Debug, Clone)]
pub enum ServiceBundle {
    InMemory(InventoryServices<InMemoryStore>),
    Postgres(InventoryServices<PostgresStore>),
}

impl ServiceBundle {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        ServiceBundle::InMemory(InventoryServices::new(Arc::new(InMemoryStore::new()), clock))
    }

    /// Build from configuration with the wall clock. Postgres connections get
    /// the schema applied before anything else runs.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        Self::connect_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn connect_with_clock(config: &StoreConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        match config {
            StoreConfig::Memory => {
                info!(store = "memory", "building services");
                Ok(Self::in_memory(clock))
            }
            StoreConfig::Postgres {
                database_url,
                max_connections,
            } => {
                info!(store = "postgres", max_connections, "building services");
                let store = PostgresStore::connect(database_url, *max_connections)
                    .await
                    .context("failed to connect to Postgres")?;
                store
                    .apply_schema()
                    .await
                    .context("failed to apply inventory schema")?;
                Ok(ServiceBundle::Postgres(InventoryServices::new(Arc::new(store), clock)))
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            ServiceBundle::InMemory(_) => "memory",
            ServiceBundle::Postgres(_) => "postgres",
        }
    }
}
