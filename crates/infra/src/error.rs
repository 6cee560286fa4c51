//! Error returned by every service operation.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A business rule refused the operation; nothing was changed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failed; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// The business-rule failure, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            ServiceError::Store(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Domain(DomainError::NotFound(_)))
    }
}
