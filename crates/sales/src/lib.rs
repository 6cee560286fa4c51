//! Sales domain module.
//!
//! Sales recorded against batches, their validation, and the pure plans that say
//! how a sale mutation moves batch stock. No IO, no storage.

pub mod query;
pub mod reconcile;
pub mod sale;

pub use query::{SaleFilter, SaleQuery, SaleSort, SaleSortField};
pub use reconcile::{StockAdjustment, UpdatePlan, plan_create, plan_delete, plan_update};
pub use sale::{Sale, SaleId, SaleRequest};
