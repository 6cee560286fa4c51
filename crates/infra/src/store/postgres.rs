//! Postgres-backed store.
//!
//! Each [`PostgresTx`] wraps one database transaction. Quantity changes are a
//! single conditional `UPDATE`, so two writers racing for the last units of a
//! batch cannot both succeed.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Batch sequence issued twice for one product |
//! | Database (check violation) | `23514` | `Database` | Row breaks a column constraint |
//! | Database (other) | Any other | `Database` | Other database errors |
//! | PoolClosed | N/A | `Database` | Connection pool was closed |
//! | ColumnDecode / ColumnNotFound | N/A | `Corrupt` | Row does not match the schema |
//! | Other | N/A | `Database` | Network errors, connection failures, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, field, instrument};
use uuid::Uuid;

use stockledger_core::{Page, Pagination};
use stockledger_inventory::{Batch, BatchCode, BatchId, BatchQuery, BatchSort, BatchSortField, StatusFilter};
use stockledger_products::{Product, ProductId, Sku};
use stockledger_sales::{Sale, SaleId, SaleQuery};

use super::{InventoryStore, QuantityUpdate, StoreError, StoreResult, StoreTx};

const SCHEMA: &str = include_str!("../../migrations/0001_inventory.sql");

/// Postgres-backed store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> StoreResult<PostgresTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

/// Open database transaction. Dropping it rolls back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

const BATCH_FILTER: &str = r#"
    product_id = $1
    AND deleted = FALSE
    AND ($2::text IS NULL OR POSITION($2::text IN LOWER(batch_code)) > 0)
    AND ($3::date IS NULL OR entry_date >= $3::date)
    AND ($4::date IS NULL OR entry_date <= $4::date)
    AND (
        $5::text = 'ALL'
        OR ($5::text = 'EXPIRED' AND expiry_date IS NOT NULL AND expiry_date <= $6::date)
        OR ($5::text = 'ACTIVE' AND (expiry_date IS NULL OR expiry_date > $6::date))
    )
    AND ($7::boolean = FALSE OR quantity > 0)
"#;

const SALE_FILTER: &str = r#"
    deleted = FALSE
    AND ($1::uuid IS NULL OR product_id = $1::uuid)
    AND ($2::uuid IS NULL OR batch_id = $2::uuid)
"#;

fn status_code(status: StatusFilter) -> &'static str {
    match status {
        StatusFilter::All => "ALL",
        StatusFilter::Active => "ACTIVE",
        StatusFilter::Expired => "EXPIRED",
    }
}

/// Ties fall back to id order, which is insertion order for UUIDv7 keys.
fn batch_order(sort: Option<BatchSort>) -> String {
    match sort {
        None => "ORDER BY id ASC".to_string(),
        Some(sort) => {
            let column = match sort.field {
                // Byte order, matching the in-memory comparison of codes.
                BatchSortField::BatchCode => r#"batch_code COLLATE "C""#,
                other => other.column(),
            };
            format!("ORDER BY {column} {}, id ASC", sort.direction.as_sql())
        }
    }
}

fn bind_batch_filter<'q>(
    query: Query<'q, Postgres, PgArguments>,
    batch_query: &BatchQuery,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(*batch_query.product_id.as_uuid())
        .bind(batch_query.filter.normalized_keyword())
        .bind(batch_query.filter.entry_from)
        .bind(batch_query.filter.entry_to)
        .bind(status_code(batch_query.filter.status))
        .bind(batch_query.today)
        .bind(batch_query.filter.in_stock_only)
}

fn bind_sale_filter<'q>(
    query: Query<'q, Postgres, PgArguments>,
    sale_query: &SaleQuery,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(sale_query.filter.product_id.map(|id| *id.as_uuid()))
        .bind(sale_query.filter.batch_id.map(|id| *id.as_uuid()))
}

fn read_count(row: &PgRow) -> StoreResult<u64> {
    let total: i64 = row
        .try_get("total")
        .map_err(|e| StoreError::Corrupt(format!("failed to read count: {e}")))?;
    Ok(total.max(0) as u64)
}

impl PostgresTx {
    async fn flag_one(&mut self, operation: &str, sql: &str, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(sql)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("{operation}: no active row {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, unit_price, sku, deleted
            FROM products
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_product", e))?;

        row.as_ref().map(decode_product).transpose()
    }

    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, unit_price, sku, deleted
            FROM products
            WHERE id = $1 AND deleted = FALSE
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;

        row.as_ref().map(decode_product).transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, unit_price, sku, deleted)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.description())
        .bind(product.unit_price())
        .bind(product.sku().as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn mark_product_deleted(&mut self, id: ProductId) -> StoreResult<()> {
        self.flag_one(
            "mark_product_deleted",
            "UPDATE products SET deleted = TRUE WHERE id = $1 AND deleted = FALSE",
            *id.as_uuid(),
        )
        .await
    }

    async fn batch(&mut self, id: BatchId) -> StoreResult<Option<Batch>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, quantity, entry_date, expiry_date, batch_code, batch_sequence, deleted
            FROM batches
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_batch", e))?;

        row.map(|row| decode::<BatchRow>(&row).map(Batch::from)).transpose()
    }

    async fn highest_batch_sequence(&mut self, product_id: ProductId) -> StoreResult<Option<i64>> {
        // No `deleted` predicate: sequences are never reused.
        let row = sqlx::query("SELECT MAX(batch_sequence) AS highest FROM batches WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("highest_batch_sequence", e))?;

        row.try_get::<Option<i64>, _>("highest")
            .map_err(|e| StoreError::Corrupt(format!("failed to read highest sequence: {e}")))
    }

    async fn insert_batch(&mut self, batch: &Batch) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO batches (
                id,
                product_id,
                quantity,
                entry_date,
                expiry_date,
                batch_code,
                batch_sequence,
                deleted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            "#,
        )
        .bind(batch.id_typed().as_uuid())
        .bind(batch.product_id().as_uuid())
        .bind(batch.quantity())
        .bind(batch.entry_date())
        .bind(batch.expiry_date())
        .bind(batch.batch_code().as_str())
        .bind(batch.batch_sequence())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_batch", e))?;
        Ok(())
    }

    #[instrument(skip(self, id), fields(batch_id = %id), err)]
    async fn adjust_quantity(&mut self, id: BatchId, delta: i64) -> StoreResult<QuantityUpdate> {
        let updated = sqlx::query(
            r#"
            UPDATE batches
            SET quantity = quantity + $2
            WHERE id = $1 AND deleted = FALSE AND quantity + $2 >= 0
            RETURNING quantity
            "#,
        )
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_quantity", e))?;

        if let Some(row) = updated {
            let quantity: i64 = row
                .try_get("quantity")
                .map_err(|e| StoreError::Corrupt(format!("failed to read quantity: {e}")))?;
            return Ok(QuantityUpdate::Applied(quantity));
        }

        let current = sqlx::query("SELECT quantity FROM batches WHERE id = $1 AND deleted = FALSE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("read_quantity", e))?;

        match current {
            Some(row) => {
                let available: i64 = row
                    .try_get("quantity")
                    .map_err(|e| StoreError::Corrupt(format!("failed to read quantity: {e}")))?;
                Ok(QuantityUpdate::Insufficient { available })
            }
            None => Ok(QuantityUpdate::Missing),
        }
    }

    #[instrument(
        skip(self, query),
        fields(product_id = %query.product_id, total = field::Empty),
        err
    )]
    async fn list_batches(&mut self, query: &BatchQuery) -> StoreResult<Page<Batch>> {
        let order = batch_order(query.sort);
        let select = format!(
            r#"
            SELECT id, product_id, quantity, entry_date, expiry_date, batch_code, batch_sequence, deleted
            FROM batches
            WHERE {BATCH_FILTER}
            {order}
            {limit}
            "#,
            limit = if query.pagination.is_some() { "LIMIT $8 OFFSET $9" } else { "" },
        );

        let mut rows_query = bind_batch_filter(sqlx::query(&select), query);
        if let Some(pagination) = query.pagination {
            rows_query = rows_query
                .bind(i64::from(pagination.limit))
                .bind(i64::from(pagination.offset));
        }
        let rows = rows_query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_batches", e))?;

        let mut batches = Vec::with_capacity(rows.len());
        for row in rows {
            batches.push(Batch::from(decode::<BatchRow>(&row)?));
        }

        let (total, pagination) = match query.pagination {
            Some(pagination) => {
                let count = format!("SELECT COUNT(*) AS total FROM batches WHERE {BATCH_FILTER}");
                let row = bind_batch_filter(sqlx::query(&count), query)
                    .fetch_one(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("count_batches", e))?;
                (read_count(&row)?, pagination)
            }
            None => (batches.len() as u64, Pagination::whole(batches.len())),
        };

        Span::current().record("total", total);
        Ok(Page::new(batches, total, pagination))
    }

    async fn mark_batch_deleted(&mut self, id: BatchId) -> StoreResult<()> {
        self.flag_one(
            "mark_batch_deleted",
            "UPDATE batches SET deleted = TRUE WHERE id = $1 AND deleted = FALSE",
            *id.as_uuid(),
        )
        .await
    }

    async fn mark_product_batches_deleted(&mut self, product_id: ProductId) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE batches SET deleted = TRUE WHERE product_id = $1 AND deleted = FALSE")
            .bind(product_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("mark_product_batches_deleted", e))?;
        Ok(result.rows_affected())
    }

    async fn sale(&mut self, id: SaleId) -> StoreResult<Option<Sale>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, batch_id, quantity, selling_price, sale_date, created_at, deleted
            FROM sales
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_sale", e))?;

        row.map(|row| decode::<SaleRow>(&row).map(Sale::from)).transpose()
    }

    async fn insert_sale(&mut self, sale: &Sale) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id,
                product_id,
                batch_id,
                quantity,
                selling_price,
                sale_date,
                created_at,
                deleted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            "#,
        )
        .bind(sale.id_typed().as_uuid())
        .bind(sale.product_id().as_uuid())
        .bind(sale.batch_id().as_uuid())
        .bind(sale.quantity())
        .bind(sale.selling_price())
        .bind(sale.sale_date())
        .bind(sale.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_sale", e))?;
        Ok(())
    }

    async fn update_sale(&mut self, sale: &Sale) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET product_id = $2,
                batch_id = $3,
                quantity = $4,
                selling_price = $5,
                sale_date = $6
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(sale.id_typed().as_uuid())
        .bind(sale.product_id().as_uuid())
        .bind(sale.batch_id().as_uuid())
        .bind(sale.quantity())
        .bind(sale.selling_price())
        .bind(sale.sale_date())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_sale", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!(
                "update_sale: no active row {}",
                sale.id_typed()
            )));
        }
        Ok(())
    }

    async fn mark_sale_deleted(&mut self, id: SaleId) -> StoreResult<()> {
        self.flag_one(
            "mark_sale_deleted",
            "UPDATE sales SET deleted = TRUE WHERE id = $1 AND deleted = FALSE",
            *id.as_uuid(),
        )
        .await
    }

    async fn mark_batch_sales_deleted(&mut self, batch_id: BatchId) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE sales SET deleted = TRUE WHERE batch_id = $1 AND deleted = FALSE")
            .bind(batch_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("mark_batch_sales_deleted", e))?;
        Ok(result.rows_affected())
    }

    async fn count_product_sales(&mut self, product_id: ProductId) -> StoreResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM sales WHERE product_id = $1 AND deleted = FALSE",
        )
        .bind(product_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("count_product_sales", e))?;
        read_count(&row)
    }

    #[instrument(skip(self, query), fields(total = field::Empty), err)]
    async fn list_sales(&mut self, query: &SaleQuery) -> StoreResult<Page<Sale>> {
        let select = format!(
            r#"
            SELECT id, product_id, batch_id, quantity, selling_price, sale_date, created_at, deleted
            FROM sales
            WHERE {SALE_FILTER}
            ORDER BY {column} {direction}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            column = query.sort.field.column(),
            direction = query.sort.direction.as_sql(),
        );
        let rows = bind_sale_filter(sqlx::query(&select), query)
            .bind(i64::from(query.pagination.limit))
            .bind(i64::from(query.pagination.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_sales", e))?;

        let mut sales = Vec::with_capacity(rows.len());
        for row in rows {
            sales.push(Sale::from(decode::<SaleRow>(&row)?));
        }

        let count = format!("SELECT COUNT(*) AS total FROM sales WHERE {SALE_FILTER}");
        let row = bind_sale_filter(sqlx::query(&count), query)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_sales", e))?;
        let total = read_count(&row)?;

        Span::current().record("total", total);
        Ok(Page::new(sales, total, query.pagination))
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

// SQLx row types

fn decode<R>(row: &PgRow) -> StoreResult<R>
where
    R: for<'r> FromRow<'r, PgRow>,
{
    R::from_row(row).map_err(|e| StoreError::Corrupt(format!("failed to decode row: {e}")))
}

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    unit_price: i64,
    sku: String,
    deleted: bool,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            unit_price: row.try_get("unit_price")?,
            sku: row.try_get("sku")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

fn decode_product(row: &PgRow) -> StoreResult<Product> {
    decode::<ProductRow>(row)?.try_into()
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let sku = Sku::parse(row.sku)
            .map_err(|e| StoreError::Corrupt(format!("product {}: {e}", row.id)))?;
        Ok(Product::restore(
            ProductId::from(row.id),
            row.name,
            row.description,
            row.unit_price,
            sku,
            row.deleted,
        ))
    }
}

#[derive(Debug)]
struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i64,
    entry_date: NaiveDate,
    expiry_date: Option<NaiveDate>,
    batch_code: String,
    batch_sequence: i64,
    deleted: bool,
}

impl<'r> FromRow<'r, PgRow> for BatchRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BatchRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            entry_date: row.try_get("entry_date")?,
            expiry_date: row.try_get("expiry_date")?,
            batch_code: row.try_get("batch_code")?,
            batch_sequence: row.try_get("batch_sequence")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch::restore(
            BatchId::from(row.id),
            ProductId::from(row.product_id),
            row.quantity,
            row.entry_date,
            row.expiry_date,
            BatchCode::from_stored(row.batch_code),
            row.batch_sequence,
            row.deleted,
        )
    }
}

#[derive(Debug)]
struct SaleRow {
    id: Uuid,
    product_id: Uuid,
    batch_id: Uuid,
    quantity: i64,
    selling_price: i64,
    sale_date: NaiveDate,
    created_at: DateTime<Utc>,
    deleted: bool,
}

impl<'r> FromRow<'r, PgRow> for SaleRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SaleRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            batch_id: row.try_get("batch_id")?,
            quantity: row.try_get("quantity")?,
            selling_price: row.try_get("selling_price")?,
            sale_date: row.try_get("sale_date")?,
            created_at: row.try_get("created_at")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        Sale::restore(
            SaleId::from(row.id),
            ProductId::from(row.product_id),
            BatchId::from(row.batch_id),
            row.quantity,
            row.selling_price,
            row.sale_date,
            row.created_at,
            row.deleted,
        )
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Database(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("bad row in {operation}: {err}"))
        }
        _ => StoreError::Database(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::SortDirection;

    #[test]
    fn unsorted_listing_uses_store_order() {
        assert_eq!(batch_order(None), "ORDER BY id ASC");
    }

    #[test]
    fn code_sort_is_bytewise_with_id_tiebreak() {
        let order = batch_order(Some(BatchSort::new(BatchSortField::BatchCode, SortDirection::Desc)));
        assert_eq!(order, r#"ORDER BY batch_code COLLATE "C" DESC, id ASC"#);

        let order = batch_order(Some(BatchSort::new(BatchSortField::ExpiryDate, SortDirection::Asc)));
        assert_eq!(order, "ORDER BY expiry_date ASC, id ASC");
    }

    #[test]
    fn status_codes_match_filter_sql() {
        for status in [StatusFilter::All, StatusFilter::Active, StatusFilter::Expired] {
            assert!(BATCH_FILTER.contains(&format!("'{}'", status_code(status))));
        }
    }
}
