//! Batch listing criteria.
//!
//! A listing is described by plain data ([`BatchQuery`]) and evaluated by pure
//! functions. Storage adapters either run [`BatchQuery::run`] over their rows or
//! translate the same struct into their own query language.

use core::cmp::Ordering;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, Page, Pagination, SoftDelete, SortDirection};
use stockledger_products::ProductId;

use crate::batch::{Batch, BatchStatus};

/// Status filter for batch listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Expired,
}

impl StatusFilter {
    pub fn admits(self, status: BatchStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == BatchStatus::Active,
            StatusFilter::Expired => status == BatchStatus::Expired,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "ALL" => Ok(StatusFilter::All),
            "ACTIVE" => Ok(StatusFilter::Active),
            "EXPIRED" => Ok(StatusFilter::Expired),
            other => Err(DomainError::validation(format!(
                "status must be ALL, ACTIVE or EXPIRED, got '{other}'"
            ))),
        }
    }
}

/// Conjunctive batch filter; every `None` criterion matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFilter {
    /// Case-insensitive substring of the batch code.
    pub keyword: Option<String>,
    /// Inclusive lower bound on the entry date.
    pub entry_from: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date.
    pub entry_to: Option<NaiveDate>,
    pub status: StatusFilter,
    /// Only batches with quantity > 0.
    pub in_stock_only: bool,
}

impl BatchFilter {
    /// Batches that can be offered for a new sale.
    pub fn sellable() -> Self {
        Self {
            status: StatusFilter::Active,
            in_stock_only: true,
            ..Self::default()
        }
    }

    /// The keyword lower-cased as given; `None` when blank.
    pub fn normalized_keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, batch: &Batch, today: NaiveDate) -> bool {
        if let Some(keyword) = self.normalized_keyword() {
            if !batch.batch_code().as_str().to_lowercase().contains(&keyword) {
                return false;
            }
        }
        if matches!(self.entry_from, Some(from) if batch.entry_date() < from) {
            return false;
        }
        if matches!(self.entry_to, Some(to) if batch.entry_date() > to) {
            return false;
        }
        if self.in_stock_only && batch.quantity() <= 0 {
            return false;
        }
        self.status.admits(batch.status(today))
    }
}

/// Sortable batch columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSortField {
    #[default]
    BatchCode,
    BatchSequence,
    Quantity,
    EntryDate,
    ExpiryDate,
}

impl BatchSortField {
    pub fn column(self) -> &'static str {
        match self {
            BatchSortField::BatchCode => "batch_code",
            BatchSortField::BatchSequence => "batch_sequence",
            BatchSortField::Quantity => "quantity",
            BatchSortField::EntryDate => "entry_date",
            BatchSortField::ExpiryDate => "expiry_date",
        }
    }

    fn compare(self, a: &Batch, b: &Batch) -> Ordering {
        match self {
            BatchSortField::BatchCode => a.batch_code().cmp(b.batch_code()),
            BatchSortField::BatchSequence => a.batch_sequence().cmp(&b.batch_sequence()),
            BatchSortField::Quantity => a.quantity().cmp(&b.quantity()),
            BatchSortField::EntryDate => a.entry_date().cmp(&b.entry_date()),
            // Missing expiry sorts last ascending, like SQL NULLS LAST.
            BatchSortField::ExpiryDate => match (a.expiry_date(), b.expiry_date()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

impl FromStr for BatchSortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch_code" | "batchCode" => Ok(BatchSortField::BatchCode),
            "batch_sequence" | "batchSequence" => Ok(BatchSortField::BatchSequence),
            "quantity" => Ok(BatchSortField::Quantity),
            "entry_date" | "entryDate" => Ok(BatchSortField::EntryDate),
            "expiry_date" | "expiryDate" => Ok(BatchSortField::ExpiryDate),
            other => Err(DomainError::validation(format!("unknown batch sort field '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSort {
    pub field: BatchSortField,
    pub direction: SortDirection,
}

impl BatchSort {
    pub fn new(field: BatchSortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Stable sort; equal keys keep store order.
pub fn sort_batches(batches: &mut [Batch], sort: BatchSort) {
    batches.sort_by(|a, b| sort.direction.orient(sort.field.compare(a, b)));
}

/// A complete batch listing request for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQuery {
    pub product_id: ProductId,
    pub filter: BatchFilter,
    /// `None` keeps store order.
    pub sort: Option<BatchSort>,
    /// `None` returns every match in one page.
    pub pagination: Option<Pagination>,
    /// Reference date for status derivation.
    pub today: NaiveDate,
}

impl BatchQuery {
    pub fn new(product_id: ProductId, today: NaiveDate) -> Self {
        Self {
            product_id,
            filter: BatchFilter::default(),
            sort: None,
            pagination: None,
            today,
        }
    }

    pub fn with_filter(mut self, filter: BatchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sorted_by(mut self, sort: BatchSort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paginated(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Does `batch` belong in the result set (ignoring order and paging)?
    pub fn selects(&self, batch: &Batch) -> bool {
        batch.is_active()
            && batch.product_id() == self.product_id
            && self.filter.matches(batch, self.today)
    }

    /// Evaluate the query over rows given in store order.
    pub fn run<'a>(&self, rows: impl IntoIterator<Item = &'a Batch>) -> Page<Batch> {
        let mut selected: Vec<Batch> = rows
            .into_iter()
            .filter(|batch| self.selects(batch))
            .cloned()
            .collect();

        if let Some(sort) = self.sort {
            sort_batches(&mut selected, sort);
        }

        match self.pagination {
            Some(pagination) => pagination.apply(selected),
            None => Pagination::whole(selected.len()).apply(selected),
        }
    }
}
