//! Sale listing criteria.

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, Page, Pagination, SoftDelete, SortDirection};
use stockledger_inventory::BatchId;
use stockledger_products::ProductId;

use crate::sale::Sale;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleFilter {
    pub product_id: Option<ProductId>,
    pub batch_id: Option<BatchId>,
}

impl SaleFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            batch_id: None,
        }
    }

    pub fn for_batch(batch_id: BatchId) -> Self {
        Self {
            product_id: None,
            batch_id: Some(batch_id),
        }
    }

    pub fn matches(&self, sale: &Sale) -> bool {
        self.product_id.is_none_or(|id| sale.product_id() == id)
            && self.batch_id.is_none_or(|id| sale.batch_id() == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleSortField {
    #[default]
    SaleDate,
    CreatedAt,
    Quantity,
    SellingPrice,
}

impl SaleSortField {
    pub fn column(self) -> &'static str {
        match self {
            SaleSortField::SaleDate => "sale_date",
            SaleSortField::CreatedAt => "created_at",
            SaleSortField::Quantity => "quantity",
            SaleSortField::SellingPrice => "selling_price",
        }
    }

    fn compare(self, a: &Sale, b: &Sale) -> Ordering {
        match self {
            SaleSortField::SaleDate => a.sale_date().cmp(&b.sale_date()),
            SaleSortField::CreatedAt => a.created_at().cmp(&b.created_at()),
            SaleSortField::Quantity => a.quantity().cmp(&b.quantity()),
            SaleSortField::SellingPrice => a.selling_price().cmp(&b.selling_price()),
        }
    }
}

impl FromStr for SaleSortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale_date" | "saleDate" => Ok(SaleSortField::SaleDate),
            "created_at" | "createdAt" => Ok(SaleSortField::CreatedAt),
            "quantity" => Ok(SaleSortField::Quantity),
            "selling_price" | "sellingPrice" => Ok(SaleSortField::SellingPrice),
            other => Err(DomainError::validation(format!("unknown sale sort field '{other}'"))),
        }
    }
}

/// Newest sales first unless asked otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSort {
    pub field: SaleSortField,
    pub direction: SortDirection,
}

impl Default for SaleSort {
    fn default() -> Self {
        Self {
            field: SaleSortField::SaleDate,
            direction: SortDirection::Desc,
        }
    }
}

impl SaleSort {
    pub fn new(field: SaleSortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleQuery {
    pub filter: SaleFilter,
    pub sort: SaleSort,
    pub pagination: Pagination,
}

impl SaleQuery {
    pub fn new(filter: SaleFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, sort: SaleSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn paginated(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn selects(&self, sale: &Sale) -> bool {
        sale.is_active() && self.filter.matches(sale)
    }

    /// Evaluate over rows in store order. Ties keep store order.
    pub fn run<'a>(&self, rows: impl IntoIterator<Item = &'a Sale>) -> Page<Sale> {
        let mut selected: Vec<Sale> = rows
            .into_iter()
            .filter(|sale| self.selects(sale))
            .cloned()
            .collect();
        let sort = self.sort;
        selected.sort_by(|a, b| sort.direction.orient(sort.field.compare(a, b)));
        self.pagination.apply(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sale::{SaleId, SaleRequest};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn sale(product: ProductId, batch: BatchId, day: u32, quantity: i64, price: i64) -> Sale {
        let request = SaleRequest {
            product_id: product,
            batch_id: batch,
            quantity,
            selling_price: price,
            sale_date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
        };
        let created = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap() + Duration::minutes(day.into());
        Sale::record(SaleId::generate(), request, created).unwrap()
    }

    #[test]
    fn default_order_is_newest_sale_first() {
        let product = ProductId::generate();
        let batch = BatchId::generate();
        let rows = vec![
            sale(product, batch, 3, 1, 10),
            sale(product, batch, 9, 2, 10),
            sale(product, batch, 5, 3, 10),
        ];
        let page = SaleQuery::new(SaleFilter::for_product(product)).run(&rows);
        let days: Vec<u32> = page.items.iter().map(|s| chrono::Datelike::day(&s.sale_date())).collect();
        assert_eq!(days, vec![9, 5, 3]);
    }

    #[test]
    fn filters_by_product_and_batch_and_skips_deleted() {
        let product = ProductId::generate();
        let batch = BatchId::generate();
        let other_batch = BatchId::generate();
        let mut rows = vec![
            sale(product, batch, 1, 1, 10),
            sale(product, other_batch, 2, 1, 10),
            sale(ProductId::generate(), batch, 3, 1, 10),
            sale(product, batch, 4, 1, 10),
        ];
        rows[3].mark_deleted();

        let by_product = SaleQuery::new(SaleFilter::for_product(product)).run(&rows);
        assert_eq!(by_product.total, 2);

        let by_batch = SaleQuery::new(SaleFilter::for_batch(batch)).run(&rows);
        assert_eq!(by_batch.total, 2);

        let both = SaleQuery::new(SaleFilter {
            product_id: Some(product),
            batch_id: Some(batch),
        })
        .run(&rows);
        assert_eq!(both.total, 1);
    }

    #[test]
    fn sorts_by_price_and_paginates() {
        let product = ProductId::generate();
        let batch = BatchId::generate();
        let rows: Vec<Sale> = (1..=5).map(|i| sale(product, batch, i, 1, i64::from(6 - i) * 10)).collect();
        let page = SaleQuery::new(SaleFilter::default())
            .sorted_by(SaleSort::new(SaleSortField::SellingPrice, SortDirection::Asc))
            .paginated(Pagination::page(1, 2))
            .run(&rows);
        let prices: Vec<i64> = page.items.iter().map(Sale::selling_price).collect();
        assert_eq!(prices, vec![10, 20]);
        assert!(page.has_more);
        assert_eq!(page.total, 5);
    }

    #[test]
    fn sort_field_parses_both_spellings() {
        assert_eq!("createdAt".parse::<SaleSortField>().unwrap(), SaleSortField::CreatedAt);
        assert_eq!("selling_price".parse::<SaleSortField>().unwrap(), SaleSortField::SellingPrice);
        assert!("batch".parse::<SaleSortField>().is_err());
    }
}
