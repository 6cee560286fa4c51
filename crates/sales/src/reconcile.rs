//! Stock reconciliation for sale mutations.
//!
//! Pure planning: given the stored sale and the requested values, work out which
//! batch quantities move and by how much. Applying the plan (and making it atomic)
//! is the caller's job.

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult};
use stockledger_inventory::BatchId;

use crate::sale::{Sale, SaleRequest};

/// Signed quantity change for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub batch_id: BatchId,
    pub delta: i64,
}

impl StockAdjustment {
    pub fn new(batch_id: BatchId, delta: i64) -> Self {
        Self { batch_id, delta }
    }
}

/// Taking stock for a new sale.
pub fn plan_create(request: &SaleRequest) -> StockAdjustment {
    StockAdjustment::new(request.batch_id, request.quantity.saturating_neg())
}

/// Giving back the stock of a deleted sale.
pub fn plan_delete(existing: &Sale) -> StockAdjustment {
    StockAdjustment::new(existing.batch_id(), existing.quantity())
}

/// How an update moves stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub batch_changed: bool,
    pub quantity_changed: bool,
    /// In application order: the old batch is credited before the new one is debited.
    pub adjustments: Vec<StockAdjustment>,
    previous_quantity: i64,
    requested_quantity: i64,
}

impl UpdatePlan {
    /// No quantity moves at all; only the sale row is rewritten.
    pub fn is_noop(&self) -> bool {
        !self.batch_changed && !self.quantity_changed
    }

    /// What the target batch can give this sale, given its current quantity.
    ///
    /// On the same batch the sale's own quantity is still held by it and counts
    /// as available.
    pub fn effective_available(&self, target_available: i64) -> i64 {
        if self.batch_changed {
            target_available
        } else {
            target_available.saturating_add(self.previous_quantity)
        }
    }

    /// Fail with `InsufficientStock` when the requested quantity exceeds what the
    /// target batch can give.
    pub fn ensure_available(&self, target_available: i64) -> DomainResult<()> {
        let effective = self.effective_available(target_available);
        if self.requested_quantity > effective {
            return Err(DomainError::insufficient_stock(effective, self.requested_quantity));
        }
        Ok(())
    }
}

pub fn plan_update(existing: &Sale, request: &SaleRequest) -> UpdatePlan {
    let batch_changed = existing.batch_id() != request.batch_id;
    let quantity_changed = existing.quantity() != request.quantity;

    let adjustments = if batch_changed {
        vec![
            StockAdjustment::new(existing.batch_id(), existing.quantity()),
            StockAdjustment::new(request.batch_id, request.quantity.saturating_neg()),
        ]
    } else if quantity_changed {
        vec![StockAdjustment::new(
            request.batch_id,
            existing.quantity().saturating_sub(request.quantity),
        )]
    } else {
        Vec::new()
    };

    UpdatePlan {
        batch_changed,
        quantity_changed,
        adjustments,
        previous_quantity: existing.quantity(),
        requested_quantity: request.quantity,
    }
}
