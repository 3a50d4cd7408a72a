//! Persistence port for the catalog counters, the movement ledger and purchase orders.
//!
//! Reads are plain lookups. Every write goes through one [`ChangeSet`] applied by
//! [`InventoryStore::commit`], which is atomic: either every stock write, row
//! insert and delete in the set lands, or none does.
//!
//! ## Optimistic concurrency
//!
//! Stock counters and orders both carry a version. A change set records the
//! version each write was decided against; the store compares it with the
//! current one and fails the whole commit with [`StoreError::Conflict`] on a
//! mismatch (`UPDATE ... WHERE version = $expected` in Postgres).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockbook_core::{ExpectedVersion, ProductId, SupplierId};
use stockbook_inventory::{MovementId, StockMovement, StockTarget};
use stockbook_purchasing::{PurchaseOrderId, PurchaseOrderRecord};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// What the catalog exposes about one stock target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub target: StockTarget,
    pub product_name: String,
    pub sku: Option<String>,
    pub variant_name: Option<String>,
    pub stock: i64,
    /// Incremented on every stock write.
    pub stock_version: u64,
}

/// Which movements to load. Results are always chronological (oldest first).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovementFilter {
    #[default]
    All,
    /// Every movement of a product, variants included.
    Product(ProductId),
    /// Movements of exactly one counter.
    Target(StockTarget),
}

impl MovementFilter {
    pub fn matches(&self, movement: &StockMovement) -> bool {
        match self {
            MovementFilter::All => true,
            MovementFilter::Product(product_id) => movement.product_id == *product_id,
            MovementFilter::Target(target) => movement.target() == *target,
        }
    }
}

/// New value for one catalog counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockWrite {
    pub target: StockTarget,
    pub expected_version: ExpectedVersion,
    pub stock: i64,
}

/// Upsert of a purchase order with its items and payments.
///
/// `ExpectedVersion::Exact(0)` inserts a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderWrite {
    pub record: PurchaseOrderRecord,
    pub expected_version: ExpectedVersion,
}

/// Unit of work applied atomically by [`InventoryStore::commit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    stock_writes: Vec<StockWrite>,
    inserted_movements: Vec<StockMovement>,
    deleted_movements: Vec<MovementId>,
    saved_orders: Vec<OrderWrite>,
    deleted_orders: Vec<PurchaseOrderId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a counter write.
    ///
    /// Writes to the same target coalesce: the first expected version is kept
    /// and the last stock value wins.
    pub fn write_stock(&mut self, target: StockTarget, expected_version: ExpectedVersion, stock: i64) {
        match self.stock_writes.iter_mut().find(|w| w.target == target) {
            Some(existing) => existing.stock = stock,
            None => self.stock_writes.push(StockWrite {
                target,
                expected_version,
                stock,
            }),
        }
    }

    pub fn insert_movement(&mut self, movement: StockMovement) {
        self.inserted_movements.push(movement);
    }

    pub fn delete_movement(&mut self, id: MovementId) {
        self.deleted_movements.push(id);
    }

    pub fn save_order(&mut self, record: PurchaseOrderRecord, expected_version: ExpectedVersion) {
        self.saved_orders.push(OrderWrite {
            record,
            expected_version,
        });
    }

    /// Deleting an order also deletes its items and payments.
    pub fn delete_order(&mut self, id: PurchaseOrderId) {
        self.deleted_orders.push(id);
    }

    pub fn stock_writes(&self) -> &[StockWrite] {
        &self.stock_writes
    }

    pub fn inserted_movements(&self) -> &[StockMovement] {
        &self.inserted_movements
    }

    pub fn deleted_movements(&self) -> &[MovementId] {
        &self.deleted_movements
    }

    pub fn saved_orders(&self) -> &[OrderWrite] {
        &self.saved_orders
    }

    pub fn deleted_orders(&self) -> &[PurchaseOrderId] {
        &self.deleted_orders
    }

    pub fn is_empty(&self) -> bool {
        self.stock_writes.is_empty()
            && self.inserted_movements.is_empty()
            && self.deleted_movements.is_empty()
            && self.saved_orders.is_empty()
            && self.deleted_orders.is_empty()
    }
}

/// Store operation error.
///
/// Infrastructure failures, as opposed to domain rejections.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A version check failed or a row vanished under a concurrent writer.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Another order already uses this code.
    #[error("purchase order code already in use: {0}")]
    DuplicateCode(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage port used by the services.
#[async_trait::async_trait]
pub trait InventoryStore: Send + Sync {
    /// Catalog counter of a product or variant; `None` if the record does not
    /// exist (or the variant belongs to another product).
    async fn stock_level(&self, target: StockTarget) -> Result<Option<CatalogEntry>, StoreError>;

    async fn supplier_name(&self, supplier_id: SupplierId) -> Result<Option<String>, StoreError>;

    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError>;

    /// Matching movements, oldest first.
    async fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, StoreError>;

    async fn order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrderRecord>, StoreError>;

    /// Every order, newest first.
    async fn orders(&self) -> Result<Vec<PurchaseOrderRecord>, StoreError>;

    async fn order_code_exists(&self, code: &str) -> Result<bool, StoreError>;

    /// Apply a change set atomically.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn stock_level(&self, target: StockTarget) -> Result<Option<CatalogEntry>, StoreError> {
        (**self).stock_level(target).await
    }

    async fn supplier_name(&self, supplier_id: SupplierId) -> Result<Option<String>, StoreError> {
        (**self).supplier_name(supplier_id).await
    }

    async fn movement(&self, id: MovementId) -> Result<Option<StockMovement>, StoreError> {
        (**self).movement(id).await
    }

    async fn movements(&self, filter: MovementFilter) -> Result<Vec<StockMovement>, StoreError> {
        (**self).movements(filter).await
    }

    async fn order(&self, id: PurchaseOrderId) -> Result<Option<PurchaseOrderRecord>, StoreError> {
        (**self).order(id).await
    }

    async fn orders(&self) -> Result<Vec<PurchaseOrderRecord>, StoreError> {
        (**self).orders().await
    }

    async fn order_code_exists(&self, code: &str) -> Result<bool, StoreError> {
        (**self).order_code_exists(code).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        (**self).commit(changes).await
    }
}
