//! Domain error model.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a caller-recoverable outcome of a business rule. Storage and
/// transport failures are modelled separately by the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (non-positive quantity/price, blank SKU, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested product, batch or sale does not exist (or is logically deleted).
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempt to sell from a batch whose expiry date is today or earlier.
    #[error("batch {batch_code} expired on {expired_on}")]
    ExpiredBatch {
        batch_code: String,
        expired_on: NaiveDate,
    },

    /// Requested quantity exceeds what the batch can give up.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },

    /// The operation conflicts with existing state (e.g. deleting a product that has sales).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn expired(batch_code: impl Into<String>, expired_on: NaiveDate) -> Self {
        Self::ExpiredBatch {
            batch_code: batch_code.into(),
            expired_on,
        }
    }

    pub fn insufficient_stock(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
