//! `stockledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;
pub mod pagination;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entity::{Entity, SoftDelete};
pub use error::{DomainError, DomainResult};
pub use id::EntityId;
pub use pagination::{Page, Pagination, SortDirection};
