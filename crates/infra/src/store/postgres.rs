//! Postgres-backed store.
//!
//! The catalog tables (`products`, `product_variants`, `suppliers`) are owned
//! by the surrounding admin application; this store only reads them and writes
//! their `stock` / `stock_version` columns. The schema below creates them when
//! missing so a fresh database is usable on its own.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation on `purchase_orders.code`) | `23505` | `DuplicateCode` |
//! | Database (other unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Anything else | | `Backend` |
//!
//! A compare-and-swap `UPDATE` that touches no row is reported as `Conflict`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use stockbook_core::{AggregateId, DomainError, ExpectedVersion, Money, ProductId, SupplierId, VariantId};
use stockbook_inventory::{MovementId, StockMovement, StockTarget};
use stockbook_purchasing::{
    OrderItemId, OrderLine, PaymentId, PurchaseOrderId, PurchaseOrderRecord, PurchasePayment,
};

use super::{CatalogEntry, ChangeSet, InventoryStore, MovementFilter, StockWrite, StoreError};

/// Schema applied by [`PostgresStore::migrate`]. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id            UUID PRIMARY KEY,
    name          TEXT NOT NULL,
    sku           TEXT,
    stock         BIGINT NOT NULL DEFAULT 0,
    stock_version BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS product_variants (
    id            UUID PRIMARY KEY,
    product_id    UUID NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    name          TEXT NOT NULL,
    sku           TEXT,
    stock         BIGINT NOT NULL DEFAULT 0,
    stock_version BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS suppliers (
    id   UUID PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_movements (
    seq          BIGSERIAL UNIQUE,
    id           UUID PRIMARY KEY,
    product_id   UUID NOT NULL REFERENCES products(id),
    variant_id   UUID REFERENCES product_variants(id),
    type         TEXT NOT NULL CHECK (type IN ('IN', 'OUT', 'ADJUSTMENT')),
    quantity     BIGINT NOT NULL,
    stock_before BIGINT NOT NULL,
    stock_after  BIGINT NOT NULL,
    reference    TEXT,
    notes        TEXT,
    created_at   TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS stock_movements_product_idx ON stock_movements (product_id, seq);

CREATE TABLE IF NOT EXISTS purchase_orders (
    seq            BIGSERIAL UNIQUE,
    id             UUID PRIMARY KEY,
    code           TEXT NOT NULL UNIQUE,
    supplier_id    UUID NOT NULL REFERENCES suppliers(id),
    status         TEXT NOT NULL,
    payment_status TEXT NOT NULL,
    total_amount   BIGINT NOT NULL,
    paid_amount    BIGINT NOT NULL,
    order_date     TIMESTAMPTZ NOT NULL,
    received_date  TIMESTAMPTZ,
    notes          TEXT,
    created_at     TIMESTAMPTZ NOT NULL,
    version        BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS purchase_order_items (
    seq          BIGSERIAL UNIQUE,
    id           UUID PRIMARY KEY,
    order_id     UUID NOT NULL REFERENCES purchase_orders(id) ON DELETE CASCADE,
    product_id   UUID NOT NULL REFERENCES products(id),
    variant_id   UUID REFERENCES product_variants(id),
    quantity     BIGINT NOT NULL CHECK (quantity > 0),
    unit_price   BIGINT NOT NULL CHECK (unit_price >= 0),
    total_price  BIGINT NOT NULL,
    received_qty BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS purchase_payments (
    seq          BIGSERIAL UNIQUE,
    id           UUID PRIMARY KEY,
    order_id     UUID NOT NULL REFERENCES purchase_orders(id) ON DELETE CASCADE,
    amount       BIGINT NOT NULL CHECK (amount > 0),
    payment_date TIMESTAMPTZ NOT NULL,
    method       TEXT,
    reference    TEXT,
    notes        TEXT,
    created_at   TIMESTAMPTZ NOT NULL
);
"#;

/// Postgres-backed [`InventoryStore`].
///
/// Every commit runs in one transaction; counter and order writes are
/// compare-and-swap updates on their version column.
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

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn load_items(
        &self,
        order_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<OrderLine>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, variant_id, quantity, unit_price, total_price, received_qty
            FROM purchase_order_items
            WHERE order_id = ANY($1)
            ORDER BY seq ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        let mut out: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let item = ItemRow::from_row(&row).map_err(|e| decode_error("item", e))?;
            out.entry(item.order_id).or_default().push(item.into());
        }
        Ok(out)
    }

    async fn load_payments(
        &self,
        order_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<PurchasePayment>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, amount, payment_date, method, reference, notes, created_at
            FROM purchase_payments
            WHERE order_id = ANY($1)
            ORDER BY seq ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_payments", e))?;

        let mut out: HashMap<Uuid, Vec<PurchasePayment>> = HashMap::new();
        for row in rows {
            let payment = PaymentRow::from_row(&row).map_err(|e| decode_error("payment", e))?;
            out.entry(payment.order_id).or_default().push(payment.into());
        }
        Ok(out)
    }

    async fn assemble_orders(&self, rows: Vec<PgRow>) -> Result<Vec<PurchaseOrderRecord>, StoreError> {
        let headers = rows
            .iter()
            .map(|r| OrderRow::from_row(r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| decode_error("purchase order", e))?;

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let mut items = self.load_items(&ids).await?;
        let mut payments = self.load_payments(&ids).await?;

        headers
            .into_iter()
            .map(|h| {
                let order_items = items.remove(&h.id).unwrap_or_default();
                let order_payments = payments.remove(&h.id).unwrap_or_default();
                h.into_record(order_items, order_payments)
            })
            .collect()
    }
}

const ORDER_COLUMNS: &str = "id, code, supplier_id, status, payment_status, total_amount, paid_amount, \
     order_date, received_date, notes, created_at, version";

#[async_trait::async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self, target), fields(stock_target = %target), err)]
    async fn stock_level(&self, target: StockTarget) -> Result<Option<CatalogEntry>, StoreError> {
        let row = match target.variant_id {
            None => {
                sqlx::query(
                    r#"
                    SELECT name AS product_name, sku, NULL::TEXT AS variant_name, stock, stock_version
                    FROM products
                    WHERE id = $1
                    "#,
                )
                .bind(target.product_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
            }
            Some(variant_id) => {
                sqlx::query(
                    r#"
                    SELECT p.name AS product_name, v.sku, v.name AS variant_name, v.stock, v.stock_version
                    FROM product_variants v
                    JOIN products p ON p.id = v.product_id
                    WHERE v.id = $1 AND v.product_id = $2
                    "#,
                )
                .bind(variant_id.as_uuid())
                .bind(target.product_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("stock_level", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stock_version: i64 = row
            .try_get("stock_version")
            .map_err(|e| decode_error("catalog entry", e))?;
        Ok(Some(CatalogEntry {
            target,
            product_name: row
                .try_get("product_name")
                .map_err(|e| decode_error("catalog entry", e))?,
            sku: row.try_get("sku").map_err(|e| decode_error("catalog entry", e))?,
            variant_name: row
                .try_get("variant_name")
                .map_err(|e| decode_error("catalog entry", e))?,
            stock: row.try_get("stock").map_err(|e| decode_error("catalog entry", e))?,
            stock_version: stock_version as u64,
        }))
    }

    #[instrument(skip(self), fields(supplier_id = %supplier_id), err)]
    async fn supplier_name(&self, supplier_id: SupplierId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT name FROM suppliers WHERE id = $1")
            .bind(supplier_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("supplier_name", e))?;

        row.map(|r| r.try_get::<String, _>("name"))
            .transpose()
            .map_err(|e| decode_error("supplier", e))
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, variant_id, type, quantity, stock_before, stock_after, reference, notes, created_at
            FROM stock_movements
            WHERE id = $1
            "#,
        )
        .bind(id.0.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("movement", e))?;

        row.map(|r| {
            StockMovement::try_from(
                MovementRow::from_row(&r).map_err(|e| decode_error("movement", e))?,
            )
        })
        .transpose()
    }

    #[instrument(skip(self), fields(movement_count = tracing::field::Empty), err)]
    async fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, StoreError> {
        const COLUMNS: &str = "SELECT id, product_id, variant_id, type, quantity, stock_before, stock_after, \
             reference, notes, created_at FROM stock_movements";

        let rows = match filter {
            MovementFilter::All => {
                sqlx::query(&format!("{COLUMNS} ORDER BY seq ASC"))
                    .fetch_all(&*self.pool)
                    .await
            }
            MovementFilter::Product(product_id) => {
                sqlx::query(&format!("{COLUMNS} WHERE product_id = $1 ORDER BY seq ASC"))
                    .bind(product_id.as_uuid())
                    .fetch_all(&*self.pool)
                    .await
            }
            MovementFilter::Target(target) => {
                sqlx::query(&format!(
                    "{COLUMNS} WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 ORDER BY seq ASC"
                ))
                .bind(target.product_id.as_uuid())
                .bind(target.variant_id.map(|v| *v.as_uuid()))
                .fetch_all(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("movements", e))?;

        Span::current().record("movement_count", rows.len());

        rows.iter()
            .map(|r| {
                StockMovement::try_from(
                    MovementRow::from_row(r).map_err(|e| decode_error("movement", e))?,
                )
            })
            .collect()
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrderRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM purchase_orders WHERE id = $1"))
            .bind(id.0.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("order", e))?;

        Ok(self.assemble_orders(rows).await?.into_iter().next())
    }

    #[instrument(skip(self), err)]
    async fn orders(&self) -> Result<Vec<PurchaseOrderRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders ORDER BY created_at DESC, seq DESC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders", e))?;

        self.assemble_orders(rows).await
    }

    #[instrument(skip(self), err)]
    async fn order_code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM purchase_orders WHERE code = $1) AS taken")
            .bind(code)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("order_code_exists", e))?;

        row.try_get("taken").map_err(|e| decode_error("code lookup", e))
    }

    #[instrument(
        skip(self, changes),
        fields(
            stock_writes = changes.stock_writes().len(),
            inserted_movements = changes.inserted_movements().len(),
            deleted_movements = changes.deleted_movements().len(),
            saved_orders = changes.saved_orders().len(),
            deleted_orders = changes.deleted_orders().len()
        ),
        err
    )]
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Any early return drops `tx`, which rolls the transaction back.
        for write in changes.stock_writes() {
            write_stock(&mut tx, write).await?;
        }

        for movement in changes.inserted_movements() {
            insert_movement(&mut tx, movement).await?;
        }

        let deleted: Vec<Uuid> = changes
            .deleted_movements()
            .iter()
            .map(|id| *id.0.as_uuid())
            .collect();
        if !deleted.is_empty() {
            let result = sqlx::query("DELETE FROM stock_movements WHERE id = ANY($1)")
                .bind(&deleted)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_movements", e))?;
            if result.rows_affected() != deleted.len() as u64 {
                return Err(StoreError::Conflict(
                    "a movement was removed concurrently".to_string(),
                ));
            }
        }

        for write in changes.saved_orders() {
            save_order(&mut tx, &write.record, write.expected_version).await?;
        }

        let deleted: Vec<Uuid> = changes
            .deleted_orders()
            .iter()
            .map(|id| *id.0.as_uuid())
            .collect();
        if !deleted.is_empty() {
            let result = sqlx::query("DELETE FROM purchase_orders WHERE id = ANY($1)")
                .bind(&deleted)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_orders", e))?;
            if result.rows_affected() != deleted.len() as u64 {
                return Err(StoreError::Conflict(
                    "a purchase order was removed concurrently".to_string(),
                ));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

async fn write_stock(tx: &mut Transaction<'_, Postgres>, write: &StockWrite) -> Result<(), StoreError> {
    let expected = match write.expected_version {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    };

    let result = match write.target.variant_id {
        None => {
            sqlx::query(
                r#"
                UPDATE products
                SET stock = $1, stock_version = stock_version + 1
                WHERE id = $2 AND ($3::BIGINT IS NULL OR stock_version = $3)
                "#,
            )
            .bind(write.stock)
            .bind(write.target.product_id.as_uuid())
            .bind(expected)
            .execute(&mut **tx)
            .await
        }
        Some(variant_id) => {
            sqlx::query(
                r#"
                UPDATE product_variants
                SET stock = $1, stock_version = stock_version + 1
                WHERE id = $2 AND product_id = $3 AND ($4::BIGINT IS NULL OR stock_version = $4)
                "#,
            )
            .bind(write.stock)
            .bind(variant_id.as_uuid())
            .bind(write.target.product_id.as_uuid())
            .bind(expected)
            .execute(&mut **tx)
            .await
        }
    }
    .map_err(|e| map_sqlx_error("write_stock", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "stock of {} changed concurrently (expected {:?})",
            write.target, write.expected_version
        )));
    }
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: &StockMovement,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, variant_id, type, quantity, stock_before, stock_after, reference, notes, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(movement.id.0.as_uuid())
    .bind(movement.product_id.as_uuid())
    .bind(movement.variant_id.map(|v| *v.as_uuid()))
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.stock_before)
    .bind(movement.stock_after)
    .bind(&movement.reference)
    .bind(&movement.notes)
    .bind(movement.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

async fn save_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &PurchaseOrderRecord,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    match expected {
        ExpectedVersion::Exact(0) => {
            sqlx::query(
                r#"
                INSERT INTO purchase_orders (
                    id, code, supplier_id, status, payment_status, total_amount, paid_amount,
                    order_date, received_date, notes, created_at, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(order.id.0.as_uuid())
            .bind(&order.code)
            .bind(order.supplier_id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.payment_status.as_str())
            .bind(order.total_amount.minor_units())
            .bind(order.paid_amount.minor_units())
            .bind(order.order_date)
            .bind(order.received_date)
            .bind(&order.notes)
            .bind(order.created_at)
            .bind(order.version as i64)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_unique_violation_on(&e, "purchase_orders_code_key") {
                    StoreError::DuplicateCode(order.code.clone())
                } else {
                    map_sqlx_error("insert_order", e)
                }
            })?;
        }
        expected => {
            let expected = match expected {
                ExpectedVersion::Any => None,
                ExpectedVersion::Exact(v) => Some(v as i64),
            };
            let result = sqlx::query(
                r#"
                UPDATE purchase_orders
                SET status = $2, payment_status = $3, paid_amount = $4, received_date = $5,
                    notes = $6, version = $7
                WHERE id = $1 AND ($8::BIGINT IS NULL OR version = $8)
                "#,
            )
            .bind(order.id.0.as_uuid())
            .bind(order.status.as_str())
            .bind(order.payment_status.as_str())
            .bind(order.paid_amount.minor_units())
            .bind(order.received_date)
            .bind(&order.notes)
            .bind(order.version as i64)
            .bind(expected)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "purchase order {} changed concurrently",
                    order.id
                )));
            }
        }
    }

    // Items are fixed at creation; only `received_qty` moves afterwards.
    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (
                id, order_id, product_id, variant_id, quantity, unit_price, total_price, received_qty
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET received_qty = EXCLUDED.received_qty
            "#,
        )
        .bind(item.id.0.as_uuid())
        .bind(order.id.0.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(item.variant_id.map(|v| *v.as_uuid()))
        .bind(item.quantity)
        .bind(item.unit_price.minor_units())
        .bind(item.total_price.minor_units())
        .bind(item.received_qty)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_item", e))?;
    }

    // Payments are append-only.
    for payment in &order.payments {
        sqlx::query(
            r#"
            INSERT INTO purchase_payments (
                id, order_id, amount, payment_date, method, reference, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(payment.id.0.as_uuid())
        .bind(order.id.0.as_uuid())
        .bind(payment.amount.minor_units())
        .bind(payment.payment_date)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;
    }

    Ok(())
}

#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    movement_type: String,
    quantity: i64,
    stock_before: i64,
    stock_after: i64,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            movement_type: row.try_get("type")?,
            quantity: row.try_get("quantity")?,
            stock_before: row.try_get("stock_before")?,
            stock_after: row.try_get("stock_after")?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        Ok(StockMovement {
            id: MovementId::new(AggregateId::from_uuid(row.id)),
            product_id: ProductId::from_uuid(row.product_id),
            variant_id: row.variant_id.map(VariantId::from_uuid),
            movement_type: row
                .movement_type
                .parse()
                .map_err(|e| StoreError::Backend(format!("corrupt movement row: {e}")))?,
            quantity: row.quantity,
            stock_before: row.stock_before,
            stock_after: row.stock_after,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    code: String,
    supplier_id: Uuid,
    status: String,
    payment_status: String,
    total_amount: i64,
    paid_amount: i64,
    order_date: DateTime<Utc>,
    received_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            supplier_id: row.try_get("supplier_id")?,
            status: row.try_get("status")?,
            payment_status: row.try_get("payment_status")?,
            total_amount: row.try_get("total_amount")?,
            paid_amount: row.try_get("paid_amount")?,
            order_date: row.try_get("order_date")?,
            received_date: row.try_get("received_date")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl OrderRow {
    fn into_record(
        self,
        items: Vec<OrderLine>,
        payments: Vec<PurchasePayment>,
    ) -> Result<PurchaseOrderRecord, StoreError> {
        let corrupt = |e: DomainError| StoreError::Backend(format!("corrupt purchase order row: {e}"));
        Ok(PurchaseOrderRecord {
            id: PurchaseOrderId::new(AggregateId::from_uuid(self.id)),
            code: self.code,
            supplier_id: SupplierId::from_uuid(self.supplier_id),
            status: self.status.parse().map_err(corrupt)?,
            payment_status: self.payment_status.parse().map_err(corrupt)?,
            total_amount: Money::new(self.total_amount),
            paid_amount: Money::new(self.paid_amount),
            order_date: self.order_date,
            received_date: self.received_date,
            notes: self.notes,
            created_at: self.created_at,
            items,
            payments,
            version: self.version as u64,
        })
    }
}

#[derive(Debug)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i64,
    unit_price: i64,
    total_price: i64,
    received_qty: i64,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            product_id: row.try_get("product_id")?,
            variant_id: row.try_get("variant_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            total_price: row.try_get("total_price")?,
            received_qty: row.try_get("received_qty")?,
        })
    }
}

impl From<ItemRow> for OrderLine {
    fn from(row: ItemRow) -> Self {
        OrderLine {
            id: OrderItemId(AggregateId::from_uuid(row.id)),
            product_id: ProductId::from_uuid(row.product_id),
            variant_id: row.variant_id.map(VariantId::from_uuid),
            quantity: row.quantity,
            unit_price: Money::new(row.unit_price),
            total_price: Money::new(row.total_price),
            received_qty: row.received_qty,
        }
    }
}

#[derive(Debug)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    amount: i64,
    payment_date: DateTime<Utc>,
    method: Option<String>,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PaymentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PaymentRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            amount: row.try_get("amount")?,
            payment_date: row.try_get("payment_date")?,
            method: row.try_get("method")?,
            reference: row.try_get("reference")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<PaymentRow> for PurchasePayment {
    fn from(row: PaymentRow) -> Self {
        PurchasePayment {
            id: PaymentId::new(AggregateId::from_uuid(row.id)),
            order_id: PurchaseOrderId::new(AggregateId::from_uuid(row.order_id)),
            amount: Money::new(row.amount),
            payment_date: row.payment_date,
            method: row.method,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

fn decode_error(what: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode {what} row: {err}"))
}

fn is_unique_violation_on(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
