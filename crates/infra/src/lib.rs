//! Infrastructure layer: storage adapters, transactional services, config.

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod query;
pub mod services;
pub mod store;


pub use catalog::ProductCatalog;
pub use config::StoreConfig;
pub use coordinator::{Cascade, SaleCoordinator};
pub use error::{ServiceError, ServiceResult};
pub use ledger::InventoryLedger;
pub use query::BatchQueryEngine;
pub use services::{InventoryServices, ServiceBundle};
pub use store::{InMemoryStore, InventoryStore, PostgresStore, StoreError, StoreTx};
