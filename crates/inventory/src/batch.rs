use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, SoftDelete, entity_id};
use stockledger_products::{ProductId, Sku};

entity_id!(
    /// Batch identifier.
    BatchId
);

/// Human-readable batch identifier: `{SKU}-{sequence}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchCode(String);

impl BatchCode {
    pub fn new(sku: &Sku, sequence: i64) -> Self {
        Self(format!("{sku}-{sequence}"))
    }

    /// Wrap a code read back from storage.
    pub fn from_stored(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for BatchCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Next sequence number for a product, given the highest one ever issued.
///
/// Returns the sequence together with its formatted code.
pub fn next_batch_code(sku: &Sku, highest: Option<i64>) -> (BatchCode, i64) {
    let sequence = highest.unwrap_or(0) + 1;
    (BatchCode::new(sku, sequence), sequence)
}

/// Derived batch status. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchStatus {
    Active,
    Expired,
}

/// `true` when a batch with this expiry date can no longer be sold on `today`.
pub fn is_expired(expiry_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    matches!(expiry_date, Some(expiry) if expiry <= today)
}

/// Apply a signed delta to a quantity, refusing to go below zero.
pub fn apply_delta(quantity: i64, delta: i64) -> DomainResult<i64> {
    let next = quantity
        .checked_add(delta)
        .ok_or_else(|| DomainError::invariant("quantity overflow"))?;
    if next < 0 {
        return Err(DomainError::insufficient_stock(quantity, delta.saturating_neg()));
    }
    Ok(next)
}

/// Input for an inventory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub product_id: ProductId,
    pub quantity: i64,
    pub entry_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

impl NewBatch {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if let Some(expiry) = self.expiry_date {
            if expiry < self.entry_date {
                return Err(DomainError::validation(
                    "expiry_date cannot be before entry_date",
                ));
            }
        }
        Ok(())
    }
}

/// A quantity of one product acquired at one time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    product_id: ProductId,
    quantity: i64,
    entry_date: NaiveDate,
    expiry_date: Option<NaiveDate>,
    batch_code: BatchCode,
    batch_sequence: i64,
    deleted: bool,
}

impl Batch {
    /// Build a fresh batch from a validated entry and its assigned code.
    pub fn record(id: BatchId, entry: NewBatch, code: BatchCode, sequence: i64) -> DomainResult<Self> {
        entry.validate()?;
        if sequence < 1 {
            return Err(DomainError::invariant("batch sequence starts at 1"));
        }
        Ok(Self {
            id,
            product_id: entry.product_id,
            quantity: entry.quantity,
            entry_date: entry.entry_date,
            expiry_date: entry.expiry_date,
            batch_code: code,
            batch_sequence: sequence,
            deleted: false,
        })
    }

    /// Rebuild a batch from persisted columns.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: BatchId,
        product_id: ProductId,
        quantity: i64,
        entry_date: NaiveDate,
        expiry_date: Option<NaiveDate>,
        batch_code: BatchCode,
        batch_sequence: i64,
        deleted: bool,
    ) -> Self {
        Self {
            id,
            product_id,
            quantity,
            entry_date,
            expiry_date,
            batch_code,
            batch_sequence,
            deleted,
        }
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.expiry_date
    }

    pub fn batch_code(&self) -> &BatchCode {
        &self.batch_code
    }

    pub fn batch_sequence(&self) -> i64 {
        self.batch_sequence
    }

    pub fn status(&self, today: NaiveDate) -> BatchStatus {
        if self.is_expired(today) {
            BatchStatus::Expired
        } else {
            BatchStatus::Active
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        is_expired(self.expiry_date, today)
    }

    /// Can be offered for a new sale: in stock and not expired.
    pub fn is_sellable(&self, today: NaiveDate) -> bool {
        self.quantity > 0 && !self.is_expired(today)
    }

    /// Fail with `ExpiredBatch` when the batch cannot be sold from on `today`.
    pub fn ensure_not_expired(&self, today: NaiveDate) -> DomainResult<()> {
        match self.expiry_date {
            Some(expiry) if expiry <= today => {
                Err(DomainError::expired(self.batch_code.as_str(), expiry))
            }
            _ => Ok(()),
        }
    }

    /// `quantity += delta`; the batch is untouched on failure.
    pub fn adjust(&mut self, delta: i64) -> DomainResult<i64> {
        self.quantity = apply_delta(self.quantity, delta)?;
        Ok(self.quantity)
    }
}

impl Entity for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl SoftDelete for Batch {
    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}
