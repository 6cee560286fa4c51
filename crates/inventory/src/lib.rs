//! Inventory domain module.
//!
//! Batches, their derived status, the non-negative quantity rule, batch-code
//! generation and the pure batch listing criteria. No IO, no storage.

pub mod batch;
pub mod query;

pub use batch::{
    Batch, BatchCode, BatchId, BatchStatus, NewBatch, apply_delta, is_expired, next_batch_code,
};
pub use query::{BatchFilter, BatchQuery, BatchSort, BatchSortField, StatusFilter, sort_batches};
